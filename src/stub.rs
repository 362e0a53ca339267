//! Stub definitions: endpoint identity, constraints, canned response and
//! the log of requests that matched.

use crate::constraint::Constraint;
use crate::error::{MockError, Result};
use crate::registry::StubRegistry;
use crate::request::{ObservedRequest, RequestHead};
use crate::response::ResponseBuilder;
use bytes::Bytes;
use hyper::{Method, StatusCode};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// One registered expectation.
///
/// Everything except the observed-request log is fixed once the stub has
/// been built.
pub struct Stub {
    method: Method,
    path: String,
    url_constraints: Vec<Box<dyn Constraint>>,
    body_constraints: Vec<Box<dyn Constraint>>,
    delay: Duration,
    response: ResponseBuilder,
    query_params: Vec<(String, String)>,
    request_headers: BTreeMap<String, String>,
    observed: Mutex<Vec<ObservedRequest>>,
}

impl Stub {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn response(&self) -> &ResponseBuilder {
        &self.response
    }

    /// Declared query parameters in declaration order. Informational only.
    pub fn query_params(&self) -> &[(String, String)] {
        &self.query_params
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Declared request headers. Informational only.
    pub fn request_headers(&self) -> &BTreeMap<String, String> {
        &self.request_headers
    }

    /// Exact (method, path) comparison.
    pub fn is_endpoint_match(&self, method: &Method, path: &str) -> bool {
        self.method == *method && self.path == path
    }

    /// True iff every URL constraint accepts `url` and every body
    /// constraint accepts `body`.
    pub fn can_verify_constraints_for(&self, url: &str, body: &str) -> bool {
        self.url_constraints.iter().all(|c| c.evaluate(url))
            && self.body_constraints.iter().all(|c| c.evaluate(body))
    }

    pub fn record_request(&self, head: &RequestHead, body: &str) {
        self.observed.lock().push(ObservedRequest::new(head, body));
    }

    pub fn request_count(&self) -> usize {
        self.observed.lock().len()
    }

    /// The newest matching request, not the oldest. Use
    /// [`observed_requests`](Self::observed_requests) for arrival order.
    pub fn last_request(&self) -> Result<ObservedRequest> {
        self.observed
            .lock()
            .last()
            .cloned()
            .ok_or_else(|| MockError::EmptyHistory {
                method: self.method.to_string(),
                path: self.path.clone(),
            })
    }

    /// Snapshot of every matching request, oldest first.
    pub fn observed_requests(&self) -> Vec<ObservedRequest> {
        self.observed.lock().clone()
    }
}

impl fmt::Display for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:{}", self.path, self.method)?;
        for (name, value) in &self.query_params {
            writeln!(f, "{name}:{value}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stub")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("url_constraints", &self.url_constraints.len())
            .field("body_constraints", &self.body_constraints.len())
            .field("delay", &self.delay)
            .field("response", &self.response)
            .field("requests", &self.request_count())
            .finish()
    }
}

/// Fluent declaration of a [`Stub`].
///
/// A builder obtained from a registry (or a processor/server) registers the
/// stub when it is finalized with [`ok`](Self::ok),
/// [`not_found`](Self::not_found) or [`with_status`](Self::with_status).
/// A detached builder from [`StubBuilder::new`] never registers anything.
pub struct StubBuilder {
    registry: Option<Arc<StubRegistry>>,
    method: Method,
    path: String,
    url_constraints: Vec<Box<dyn Constraint>>,
    body_constraints: Vec<Box<dyn Constraint>>,
    delay: Duration,
    response: ResponseBuilder,
    query_params: Vec<(String, String)>,
    request_headers: BTreeMap<String, String>,
}

impl StubBuilder {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            registry: None,
            method,
            path: path.into(),
            url_constraints: Vec::new(),
            body_constraints: Vec::new(),
            delay: Duration::ZERO,
            response: ResponseBuilder::new(),
            query_params: Vec::new(),
            request_headers: BTreeMap::new(),
        }
    }

    pub(crate) fn attached(registry: Arc<StubRegistry>, method: Method, path: impl Into<String>) -> Self {
        Self {
            registry: Some(registry),
            ..Self::new(method, path)
        }
    }

    pub fn with_url_constraint(mut self, constraint: impl Constraint + 'static) -> Self {
        self.url_constraints.push(Box::new(constraint));
        self
    }

    pub fn with_body_constraint(mut self, constraint: impl Constraint + 'static) -> Self {
        self.body_constraints.push(Box::new(constraint));
        self
    }

    /// Add to the response delay. Repeated calls accumulate.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay += delay;
        self
    }

    /// Replace the declared query parameters. Order is kept; a repeated
    /// name keeps its first position and its last value.
    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query_params.clear();
        for (name, value) in params {
            let (name, value) = (name.into(), value.into());
            match self.query_params.iter_mut().find(|(k, _)| *k == name) {
                Some(entry) => entry.1 = value,
                None => self.query_params.push((name, value)),
            }
        }
        self
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.request_headers = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn returns(mut self, body: impl Into<String>) -> Self {
        self.response.with_body(body);
        self
    }

    pub fn returns_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.response.with_bytes(body);
        self
    }

    /// Body computed each time the stub answers.
    pub fn returns_with<F>(mut self, supplier: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.response.with_supplier(supplier);
        self
    }

    pub fn returns_json(mut self, body: &serde_json::Value) -> Self {
        self.response
            .with_body(body.to_string())
            .with_content_type("application/json");
        self
    }

    pub fn returns_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.response.with_file(path)?;
        Ok(self)
    }

    pub fn returns_file_range(mut self, path: impl AsRef<Path>, from: u64, to: u64) -> Result<Self> {
        self.response.with_file_range(path, from, to)?;
        Ok(self)
    }

    pub fn as_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.response.with_content_type(content_type);
        self
    }

    pub fn as_xml_content(self) -> Self {
        self.as_content_type("text/xml")
    }

    pub fn add_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.response.add_header(name, value);
        self
    }

    pub fn with_response_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        self.response.add_headers(headers);
        self
    }

    pub fn response_mut(&mut self) -> &mut ResponseBuilder {
        &mut self.response
    }

    /// Build the stub without registering it.
    pub fn build(self) -> Stub {
        Stub {
            method: self.method,
            path: self.path,
            url_constraints: self.url_constraints,
            body_constraints: self.body_constraints,
            delay: self.delay,
            response: self.response,
            query_params: self.query_params,
            request_headers: self.request_headers,
            observed: Mutex::new(Vec::new()),
        }
    }

    /// Set the response status and register the stub.
    pub fn with_status(mut self, status: StatusCode) -> Arc<Stub> {
        self.response.with_status(status);
        let registry = self.registry.take();
        let stub = Arc::new(self.build());
        if let Some(registry) = registry {
            registry.add(Arc::clone(&stub));
        }
        stub
    }

    pub fn ok(self) -> Arc<Stub> {
        self.with_status(StatusCode::OK)
    }

    pub fn not_found(self) -> Arc<Stub> {
        self.with_status(StatusCode::NOT_FOUND)
    }
}
