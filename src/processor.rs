//! Request processing pipeline.
//!
//! Each inbound request is buffered, matched against the registry and
//! answered either with the matched stub's response (after its delay) or
//! with a diagnostic 404. The request is recorded on the matched stub once
//! the response has been handed to the transport.

use crate::config::GlobalSettings;
use crate::matcher::Matcher;
use crate::registry::StubRegistry;
use crate::request::RequestHead;
use crate::response::{MockBody, ResponseBody, ResponseHead};
use crate::stub::{Stub, StubBuilder};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::BodyExt;
use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH};
use hyper::{Method, Response, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Error type of inbound body streams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Inbound body: byte chunks terminated by end-of-stream or an error.
pub type RequestBody = UnsyncBoxBody<Bytes, BoxError>;

/// Header set on responses the server generates itself.
pub const DIAGNOSTIC_HEADER: HeaderName = HeaderName::from_static("x-httpstub-error");

/// Diagnostic text for unmatched requests.
pub const NO_HANDLER_MESSAGE: &str = "No handler found to handle request";

/// Receives the response for one request.
pub trait ResponseSink: Send {
    /// `body` is `None` when no body follows the head.
    fn on_response(self: Box<Self>, head: ResponseHead, body: Option<ResponseBody>);
}

impl ResponseSink for oneshot::Sender<(ResponseHead, Option<ResponseBody>)> {
    fn on_response(self: Box<Self>, head: ResponseHead, body: Option<ResponseBody>) {
        // The receiver is gone when the client hung up first.
        let _ = (*self).send((head, body));
    }
}

/// Entry point the transport calls for every request.
#[async_trait]
pub trait RequestDelegate: Send + Sync {
    async fn on_request(&self, head: RequestHead, body: RequestBody, sink: Box<dyn ResponseSink>);
}

/// Owns the stub registry and the miss counter for one server.
#[derive(Debug)]
pub struct RequestProcessor {
    registry: Arc<StubRegistry>,
    matcher: Matcher,
    settings: GlobalSettings,
    /// Requests no stub matched since the last clear.
    misses: AtomicU64,
}

impl Default for RequestProcessor {
    fn default() -> Self {
        Self::new(GlobalSettings::default())
    }
}

impl RequestProcessor {
    pub fn new(settings: GlobalSettings) -> Self {
        Self {
            registry: Arc::new(StubRegistry::new()),
            matcher: Matcher::new(),
            settings,
            misses: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<StubRegistry> {
        &self.registry
    }

    /// Start declaring a stub; it becomes visible once finalized.
    pub fn stub(&self, method: Method, path: impl Into<String>) -> StubBuilder {
        self.registry.stub(method, path)
    }

    pub fn add(&self, stub: Arc<Stub>) {
        self.registry.add(stub);
    }

    /// Number of unmatched requests since the last clear.
    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::SeqCst)
    }

    /// Look a stub up by identity alone.
    pub fn find_handler(&self, method: &Method, path: &str) -> Option<Arc<Stub>> {
        self.registry.find(method, path)
    }

    /// Text dump of every registered stub.
    pub fn what_do_i_have(&self) -> String {
        let mut dump = String::from("Handlers:\n");
        for stub in self.registry.snapshot() {
            dump.push_str(&stub.to_string());
        }
        dump
    }

    /// Registered stubs, in registration order.
    pub fn get_all_requests(&self) -> Vec<Arc<Stub>> {
        self.registry.snapshot()
    }

    /// Remove every stub and reset the miss counter.
    pub fn clear_handlers(&self) {
        let removed = self.registry.clear();
        self.misses.store(0, Ordering::SeqCst);
        info!(removed, "Cleared stub handlers");
    }

    /// Process one request and assemble the HTTP response.
    pub async fn handle(&self, head: RequestHead, body: RequestBody) -> Response<MockBody> {
        let (tx, rx) = oneshot::channel();
        self.on_request(head, body, Box::new(tx)).await;
        match rx.await {
            Ok((head, body)) => head.into_response(body),
            Err(_) => diagnostic_head(StatusCode::INTERNAL_SERVER_ERROR, "No response produced")
                .into_response(None),
        }
    }

    fn respond_not_found(&self, head: &RequestHead, sink: Box<dyn ResponseSink>) {
        let misses = self.misses.fetch_add(1, Ordering::SeqCst) + 1;
        if self.settings.log_unmatched {
            warn!(
                method = %head.method,
                uri = %head.uri,
                misses,
                "No matching stub found"
            );
        }
        sink.on_response(diagnostic_head(StatusCode::NOT_FOUND, NO_HANDLER_MESSAGE), None);
    }

    async fn dispatch(
        &self,
        head: RequestHead,
        body: String,
        stub: Arc<Stub>,
        sink: Box<dyn ResponseSink>,
    ) {
        if self.settings.log_matches {
            info!(
                method = %head.method,
                uri = %head.uri,
                stub = %format!("{} {}", stub.method(), stub.path()),
                "Request matched stub"
            );
        }

        let delay = stub.delay();
        if !delay.is_zero() {
            debug!(?delay, "Applying delay");
            tokio::time::sleep(delay).await;
        }

        let prepared = stub.response().prepare();
        let response_body = if head.method == Method::HEAD {
            None
        } else {
            match prepared.build_body().await {
                Ok(body) => Some(body),
                Err(e) => {
                    warn!(error = %e, path = %stub.path(), "Failed to open response body");
                    sink.on_response(
                        diagnostic_head(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
                        None,
                    );
                    stub.record_request(&head, &body);
                    return;
                }
            }
        };

        sink.on_response(prepared.build_headers(), response_body);
        stub.record_request(&head, &body);
        debug!(method = %head.method, uri = %head.uri, "End processing request");
    }
}

#[async_trait]
impl RequestDelegate for RequestProcessor {
    async fn on_request(&self, head: RequestHead, body: RequestBody, sink: Box<dyn ResponseSink>) {
        debug!(method = %head.method, uri = %head.uri, "Start processing request");

        if self.registry.is_empty() {
            self.respond_not_found(&head, sink);
            return;
        }

        let body = if head.has_body() {
            buffer_body(body).await
        } else {
            String::new()
        };

        let stubs = self.registry.snapshot();
        let url = head.url();
        let matched = self
            .matcher
            .find_match(&stubs, &head.method, head.path(), &url, &body);

        match matched {
            Some(stub) => self.dispatch(head, body, stub, sink).await,
            None => self.respond_not_found(&head, sink),
        }
    }
}

/// Wait for the whole body. A failed read counts as an empty body.
async fn buffer_body(body: RequestBody) -> String {
    match body.collect().await {
        Ok(collected) => {
            let text = String::from_utf8_lossy(&collected.to_bytes()).into_owned();
            debug!(len = text.len(), "Buffered request body");
            text
        }
        Err(e) => {
            debug!(error = %e, "Error while reading body");
            String::new()
        }
    }
}

fn diagnostic_head(status: StatusCode, message: &str) -> ResponseHead {
    let mut head = ResponseHead::new(status);
    head.headers.insert(CONTENT_LENGTH, HeaderValue::from(0u64));
    let value = HeaderValue::from_str(message)
        .unwrap_or_else(|_| HeaderValue::from_static(NO_HANDLER_MESSAGE));
    head.headers.insert(DIAGNOSTIC_HEADER, value);
    head
}
