//! Response synthesis for matched stubs.
//!
//! A [`ResponseBuilder`] holds the declared status, content type, headers
//! and exactly one [`BodySource`]. Each time a stub is matched the builder is
//! prepared into a [`PreparedResponse`], which resolves the body source once
//! (invoking a supplier if there is one) and can then produce the response
//! head and the body producer any number of times.

use crate::error::{MockError, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{HeaderMap, Response, StatusCode};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;
use tracing::warn;

/// Body type handed to the HTTP transport.
pub type MockBody = UnsyncBoxBody<Bytes, io::Error>;

/// Lazily evaluated response body.
pub type BodySupplier = Arc<dyn Fn() -> String + Send + Sync>;

/// Default content type for stub responses.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Where the bytes of a response body come from.
#[derive(Clone)]
pub enum BodySource {
    /// Literal text
    Text(String),
    /// Text produced at response-build time
    Supplier(BodySupplier),
    /// Raw bytes
    Bytes(Bytes),
    /// Whole file, length captured at declaration
    File { path: PathBuf, len: u64 },
    /// Half-open byte range `[from, to)` of a file
    FileRange { path: PathBuf, from: u64, to: u64 },
}

impl fmt::Debug for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodySource::Text(text) => f.debug_tuple("Text").field(text).finish(),
            BodySource::Supplier(_) => f.write_str("Supplier(..)"),
            BodySource::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            BodySource::File { path, len } => f
                .debug_struct("File")
                .field("path", path)
                .field("len", len)
                .finish(),
            BodySource::FileRange { path, from, to } => f
                .debug_struct("FileRange")
                .field("path", path)
                .field("from", from)
                .field("to", to)
                .finish(),
        }
    }
}

impl Default for BodySource {
    fn default() -> Self {
        BodySource::Text(String::new())
    }
}

/// Declared response of a stub.
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    status: StatusCode,
    content_type: String,
    /// Lower-cased header name to value
    headers: BTreeMap<String, String>,
    body: BodySource,
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            headers: BTreeMap::new(),
            body: BodySource::default(),
        }
    }
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    pub fn with_content_type(&mut self, content_type: impl Into<String>) -> &mut Self {
        self.content_type = content_type.into();
        self
    }

    /// Set a header, replacing any earlier value with the same name.
    pub fn add_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) -> &mut Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn add_headers<I, K, V>(&mut self, headers: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.add_header(name, value);
        }
        self
    }

    pub fn with_body(&mut self, body: impl Into<String>) -> &mut Self {
        self.body = BodySource::Text(body.into());
        self
    }

    pub fn with_bytes(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.body = BodySource::Bytes(body.into());
        self
    }

    /// Produce the body on every response build instead of once up front.
    pub fn with_supplier<F>(&mut self, supplier: F) -> &mut Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.body = BodySource::Supplier(Arc::new(supplier));
        self
    }

    /// Stream a whole file. Fails now if the file cannot be read.
    pub fn with_file(&mut self, path: impl AsRef<Path>) -> Result<&mut Self> {
        let path = path.as_ref();
        let len = readable_file_len(path)?;
        self.body = BodySource::File {
            path: path.to_path_buf(),
            len,
        };
        Ok(self)
    }

    /// Stream the bytes `[from, to)` of a file. Fails now if the file cannot
    /// be read or the range does not fit it.
    pub fn with_file_range(&mut self, path: impl AsRef<Path>, from: u64, to: u64) -> Result<&mut Self> {
        let path = path.as_ref();
        let len = readable_file_len(path)?;
        if from > to || to > len {
            return Err(MockError::InvalidFileRange {
                path: path.to_path_buf(),
                from,
                to,
                len,
            });
        }
        self.body = BodySource::FileRange {
            path: path.to_path_buf(),
            from,
            to,
        };
        Ok(self)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> &BodySource {
        &self.body
    }

    /// Resolve the body source for one response.
    pub fn prepare(&self) -> PreparedResponse {
        let content = match &self.body {
            BodySource::Text(text) => PreparedBody::Memory(Bytes::from(text.clone())),
            BodySource::Supplier(supplier) => PreparedBody::Memory(Bytes::from(supplier())),
            BodySource::Bytes(bytes) => PreparedBody::Memory(bytes.clone()),
            BodySource::File { path, len } => PreparedBody::File {
                path: path.clone(),
                offset: 0,
                len: *len,
            },
            BodySource::FileRange { path, from, to } => PreparedBody::File {
                path: path.clone(),
                offset: *from,
                len: to - from,
            },
        };

        PreparedResponse {
            status: self.status,
            content_type: self.content_type.clone(),
            headers: self.headers.clone(),
            content,
        }
    }
}

fn readable_file_len(path: &Path) -> Result<u64> {
    let not_found = |source: io::Error| MockError::FileNotFound {
        path: path.to_path_buf(),
        source,
    };

    let file = std::fs::File::open(path).map_err(not_found)?;
    let metadata = file.metadata().map_err(not_found)?;
    if !metadata.is_file() {
        return Err(not_found(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }
    Ok(metadata.len())
}

#[derive(Debug, Clone)]
enum PreparedBody {
    Memory(Bytes),
    File { path: PathBuf, offset: u64, len: u64 },
}

/// A response with its body source resolved.
#[derive(Debug, Clone)]
pub struct PreparedResponse {
    status: StatusCode,
    content_type: String,
    headers: BTreeMap<String, String>,
    content: PreparedBody,
}

impl PreparedResponse {
    pub fn content_length(&self) -> u64 {
        match &self.content {
            PreparedBody::Memory(bytes) => bytes.len() as u64,
            PreparedBody::File { len, .. } => *len,
        }
    }

    /// Status and headers, with Content-Type and Content-Length computed
    /// from the resolved body.
    pub fn build_headers(&self) -> ResponseHead {
        let mut head = ResponseHead::new(self.status);

        for (name, value) in &self.headers {
            match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
                (Ok(name), Ok(value)) => {
                    head.headers.insert(name, value);
                }
                _ => warn!(header = %name, "Skipping invalid response header"),
            }
        }

        match HeaderValue::try_from(self.content_type.as_str()) {
            Ok(value) => {
                head.headers.insert(CONTENT_TYPE, value);
            }
            Err(_) => warn!(content_type = %self.content_type, "Skipping invalid content type"),
        }
        head.headers
            .insert(CONTENT_LENGTH, HeaderValue::from(self.content_length()));

        head
    }

    /// Body producer for one transmission. File-backed bodies open their
    /// file here; the handle closes when the producer is dropped.
    pub async fn build_body(&self) -> Result<ResponseBody> {
        match &self.content {
            PreparedBody::Memory(bytes) => Ok(ResponseBody::Memory(bytes.clone())),
            PreparedBody::File { path, offset, len } => {
                let mut file = tokio::fs::File::open(path).await?;
                let current = file.metadata().await?.len();
                if offset + len > current {
                    return Err(MockError::InvalidFileRange {
                        path: path.clone(),
                        from: *offset,
                        to: offset + len,
                        len: current,
                    });
                }
                if *offset > 0 {
                    file.seek(SeekFrom::Start(*offset)).await?;
                }
                Ok(ResponseBody::File(file.take(*len)))
            }
        }
    }
}

/// Status line and headers of a response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseHead {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
        }
    }

    /// Assemble an HTTP response. `None` sends no body at all.
    pub fn into_response(self, body: Option<ResponseBody>) -> Response<MockBody> {
        let body = match body {
            Some(body) => body.into_http_body(),
            None => Empty::new().map_err(|never: Infallible| match never {}).boxed_unsync(),
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Bytes of a response body, ready for transmission.
#[derive(Debug)]
pub enum ResponseBody {
    Memory(Bytes),
    File(Take<tokio::fs::File>),
}

impl ResponseBody {
    pub fn into_http_body(self) -> MockBody {
        match self {
            ResponseBody::Memory(bytes) => Full::new(bytes)
                .map_err(|never: Infallible| match never {})
                .boxed_unsync(),
            ResponseBody::File(file) => {
                StreamBody::new(ReaderStream::new(file).map_ok(Frame::data)).boxed_unsync()
            }
        }
    }

    /// Drain the producer into memory.
    pub async fn read_to_bytes(self) -> io::Result<Bytes> {
        let collected = self.into_http_body().collect().await?;
        Ok(collected.to_bytes())
    }
}
