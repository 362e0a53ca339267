//! Request matching logic.
//!
//! Matches incoming requests against registered stubs.

use crate::stub::Stub;
use hyper::Method;
use std::sync::Arc;

/// Request matcher engine.
///
/// A stub matches when its (method, path) equals the request's exactly and
/// all of its constraints accept the request URL and body. Stubs are tried
/// in registration order and the first match wins; there is no specificity
/// scoring.
#[derive(Debug, Default, Clone, Copy)]
pub struct Matcher;

impl Matcher {
    pub fn new() -> Self {
        Self
    }

    /// Find the first matching stub for a request.
    pub fn find_match(
        &self,
        stubs: &[Arc<Stub>],
        method: &Method,
        path: &str,
        url: &str,
        body: &str,
    ) -> Option<Arc<Stub>> {
        stubs
            .iter()
            .filter(|stub| stub.is_endpoint_match(method, path))
            .find(|stub| stub.can_verify_constraints_for(url, body))
            .cloned()
    }
}
