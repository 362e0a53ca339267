//! HTTP Stub Server
//!
//! An in-process HTTP test double. Tests register stubs describing which
//! requests to answer and how, point the system under test at the server,
//! and afterwards inspect what each stub received.
//!
//! # Features
//!
//! - **Endpoint Matching**: Exact method and path, refined by URL and body constraints
//! - **Canned Responses**: Text, bytes, JSON, lazily supplied bodies, files and file ranges
//! - **Latency Simulation**: Per-stub response delays
//! - **Request Verification**: Per-stub request logs with headers, body and query
//! - **Diagnostics**: Unmatched requests get a 404 with an explanatory header and are counted
//!
//! # Example
//!
//! ```no_run
//! use http_stub_server::MockServer;
//! use hyper::Method;
//!
//! # async fn demo() -> std::io::Result<()> {
//! let server = MockServer::start().await?;
//! let search = server
//!     .stub(Method::POST, "/search")
//!     .with_body_constraint(|body: &str| body.contains("<q>rust</q>"))
//!     .returns("<results/>")
//!     .as_xml_content()
//!     .ok();
//!
//! // ... exercise the system under test against server.uri() ...
//!
//! assert_eq!(search.request_count(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Example Configuration
//!
//! ```yaml
//! stubs:
//!   - name: hello
//!     method: GET
//!     path: /hello
//!     response:
//!       status: 200
//!       body:
//!         type: json
//!         content:
//!           message: "Hello, World!"
//! ```

pub mod config;
pub mod constraint;
pub mod error;
pub mod matcher;
pub mod processor;
pub mod registry;
pub mod request;
pub mod response;
pub mod server;
pub mod stub;

pub use config::{GlobalSettings, MockServerConfig};
pub use constraint::{Constraint, TextConstraint};
pub use error::{MockError, Result};
pub use processor::{RequestDelegate, RequestProcessor, ResponseSink, DIAGNOSTIC_HEADER};
pub use registry::StubRegistry;
pub use request::{ObservedRequest, RequestHead};
pub use response::{BodySource, PreparedResponse, ResponseBuilder};
pub use server::MockServer;
pub use stub::{Stub, StubBuilder};
