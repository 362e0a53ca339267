//! HTTP/1.1 transport around a [`RequestProcessor`].
//!
//! One task per connection; in-flight connections are aborted when the
//! server shuts down, which also cancels any pending response delay.

use crate::config::GlobalSettings;
use crate::processor::{BoxError, RequestProcessor};
use crate::request::RequestHead;
use crate::response::MockBody;
use crate::stub::StubBuilder;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

/// A running stub server.
#[derive(Debug)]
pub struct MockServer {
    addr: SocketAddr,
    processor: Arc<RequestProcessor>,
    shutdown_tx: broadcast::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl MockServer {
    /// Serve on an ephemeral localhost port with default settings.
    pub async fn start() -> io::Result<Self> {
        Self::bind(SocketAddr::from(([127, 0, 0, 1], 0)), GlobalSettings::default()).await
    }

    pub async fn bind(addr: SocketAddr, settings: GlobalSettings) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Self::from_listener(listener, Arc::new(RequestProcessor::new(settings)))
    }

    /// Serve an already bound listener.
    pub fn from_listener(listener: TcpListener, processor: Arc<RequestProcessor>) -> io::Result<Self> {
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        info!(%addr, "Stub server listening");
        let handle = tokio::spawn(accept_loop(listener, Arc::clone(&processor), shutdown_rx));

        Ok(Self {
            addr,
            processor,
            shutdown_tx,
            handle: Some(handle),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URI, e.g. `http://127.0.0.1:49152`.
    pub fn uri(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn processor(&self) -> &Arc<RequestProcessor> {
        &self.processor
    }

    /// Start declaring a stub on this server.
    pub fn stub(&self, method: Method, path: impl Into<String>) -> StubBuilder {
        self.processor.stub(method, path)
    }

    pub fn miss_count(&self) -> u64 {
        self.processor.miss_count()
    }

    /// Stop accepting connections and abort the ones in flight.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Accept loop ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn accept_loop(
    listener: TcpListener,
    processor: Arc<RequestProcessor>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let processor = Arc::clone(&processor);
                        connections.spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let processor = Arc::clone(&processor);
                                async move { Ok::<_, Infallible>(serve_request(&processor, req).await) }
                            });
                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                debug!(%peer, "Connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown_rx.recv() => {
                info!(in_flight = connections.len(), "Stub server shutting down");
                break;
            }
        }
    }

    connections.shutdown().await;
}

async fn serve_request(processor: &RequestProcessor, req: Request<Incoming>) -> Response<MockBody> {
    let (parts, body) = req.into_parts();
    let head = RequestHead {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
    };
    let body = body.map_err(BoxError::from).boxed_unsync();
    processor.handle(head, body).await
}
