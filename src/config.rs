//! Configuration for the stub server.
//!
//! Declares stubs (endpoint identity, constraints, canned responses) and
//! server-wide settings in YAML.

use crate::constraint::TextConstraint;
use crate::processor::RequestProcessor;
use crate::stub::{Stub, StubBuilder};
use hyper::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Main configuration for the stub server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockServerConfig {
    /// Stub definitions, in match-priority order
    #[serde(default)]
    pub stubs: Vec<StubDefinition>,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl MockServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (i, stub) in self.stubs.iter().enumerate() {
            stub.validate()
                .map_err(|e| anyhow::anyhow!("Stub {}: {}", i, e))?;
        }
        Ok(())
    }

    /// Build every stub and register it with the processor, in order.
    ///
    /// Fails on the first stub whose response file cannot be read.
    pub fn register(&self, processor: &RequestProcessor) -> anyhow::Result<Vec<Arc<Stub>>> {
        let mut registered = Vec::with_capacity(self.stubs.len());
        for (i, definition) in self.stubs.iter().enumerate() {
            let builder = processor.stub(definition.method()?, definition.path.clone());
            let stub = definition
                .apply(builder, &self.settings)
                .map_err(|e| anyhow::anyhow!("Stub {}: {}", i, e))?;
            registered.push(stub);
        }
        Ok(registered)
    }
}

/// A single stub definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StubDefinition {
    /// Optional name/description
    #[serde(default)]
    pub name: Option<String>,

    /// HTTP method
    #[serde(default = "default_method")]
    pub method: String,

    /// Exact request path
    pub path: String,

    /// Constraints on the full request URL
    #[serde(default)]
    pub url_constraints: Vec<ConstraintDefinition>,

    /// Constraints on the request body
    #[serde(default)]
    pub body_constraints: Vec<ConstraintDefinition>,

    /// Expected query parameters (informational)
    #[serde(default)]
    pub query: BTreeMap<String, String>,

    /// Expected request headers (informational)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Delay before responding
    #[serde(default)]
    pub delay_ms: u64,

    /// Response to return
    #[serde(default)]
    pub response: ResponseDefinition,
}

fn default_method() -> String {
    "GET".to_string()
}

impl StubDefinition {
    /// Validate the stub definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.method()?;
        if !self.path.starts_with('/') {
            anyhow::bail!("Path must start with '/': {}", self.path);
        }
        for constraint in self.url_constraints.iter().chain(&self.body_constraints) {
            constraint.compile()?;
        }
        self.response.validate()?;
        Ok(())
    }

    /// Parsed HTTP method.
    pub fn method(&self) -> anyhow::Result<Method> {
        Method::from_bytes(self.method.to_uppercase().as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid method {}: {}", self.method, e))
    }

    fn apply(&self, builder: StubBuilder, settings: &GlobalSettings) -> anyhow::Result<Arc<Stub>> {
        let mut builder = builder
            .with_params(self.query.clone())
            .with_headers(self.headers.clone())
            .with_delay(Duration::from_millis(self.delay_ms));

        for constraint in &self.url_constraints {
            builder = builder.with_url_constraint(constraint.compile()?);
        }
        for constraint in &self.body_constraints {
            builder = builder.with_body_constraint(constraint.compile()?);
        }

        let response = &self.response;
        if let Some(body) = &response.body {
            builder = body.apply(builder)?;
        }

        let content_type = response
            .content_type
            .clone()
            .or_else(|| {
                response
                    .body
                    .as_ref()
                    .and_then(|b| b.content_type())
                    .map(String::from)
            })
            .unwrap_or_else(|| settings.default_content_type.clone());

        let status = StatusCode::from_u16(response.status)?;
        Ok(builder
            .as_content_type(content_type)
            .with_response_headers(response.headers.clone())
            .with_status(status))
    }
}

/// Declarative string constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintDefinition {
    /// Exact match
    Exact { value: String },
    /// Must contain substring
    Contains { value: String },
    /// Must not contain substring
    NotContains { value: String },
    /// Must start with prefix
    StartsWith { value: String },
    /// Regex pattern match
    Regex { pattern: String },
}

impl ConstraintDefinition {
    /// Compile into a constraint.
    pub fn compile(&self) -> anyhow::Result<TextConstraint> {
        Ok(match self {
            ConstraintDefinition::Exact { value } => TextConstraint::Exact(value.clone()),
            ConstraintDefinition::Contains { value } => TextConstraint::Contains(value.clone()),
            ConstraintDefinition::NotContains { value } => {
                TextConstraint::NotContains(value.clone())
            }
            ConstraintDefinition::StartsWith { value } => {
                TextConstraint::StartsWith(value.clone())
            }
            ConstraintDefinition::Regex { pattern } => TextConstraint::regex(pattern)
                .map_err(|e| anyhow::anyhow!("Invalid regex: {}", e))?,
        })
    }
}

/// Response definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Content type; derived from the body kind when absent
    #[serde(default)]
    pub content_type: Option<String>,

    /// Response headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Response body
    #[serde(default)]
    pub body: Option<ResponseBody>,
}

fn default_status() -> u16 {
    200
}

impl Default for ResponseDefinition {
    fn default() -> Self {
        Self {
            status: default_status(),
            content_type: None,
            headers: BTreeMap::new(),
            body: None,
        }
    }
}

impl ResponseDefinition {
    /// Validate the response definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.status < 100 || self.status > 599 {
            anyhow::bail!("Invalid status code: {}", self.status);
        }
        if let Some(ResponseBody::FileRange { from, to, .. }) = &self.body {
            if from > to {
                anyhow::bail!("Invalid file range: {}..{}", from, to);
            }
        }
        Ok(())
    }
}

/// Response body configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Plain text body
    Text { content: String },
    /// JSON body
    Json { content: serde_json::Value },
    /// Base64 encoded binary
    Base64 { content: String },
    /// Stream a whole file
    File { path: String },
    /// Stream the bytes `[from, to)` of a file
    FileRange { path: String, from: u64, to: u64 },
}

impl ResponseBody {
    /// Content type implied by the body kind, if any.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            ResponseBody::Text { .. } => None,
            ResponseBody::Json { .. } => Some("application/json"),
            ResponseBody::Base64 { .. }
            | ResponseBody::File { .. }
            | ResponseBody::FileRange { .. } => Some("application/octet-stream"),
        }
    }

    fn apply(&self, builder: StubBuilder) -> anyhow::Result<StubBuilder> {
        Ok(match self {
            ResponseBody::Text { content } => builder.returns(content.clone()),
            ResponseBody::Json { content } => builder.returns(content.to_string()),
            ResponseBody::Base64 { content } => {
                use base64::Engine;
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(content)
                    .map_err(|e| anyhow::anyhow!("Invalid base64: {}", e))?;
                builder.returns_bytes(bytes)
            }
            ResponseBody::File { path } => builder.returns_file(path)?,
            ResponseBody::FileRange { path, from, to } => {
                builder.returns_file_range(path, *from, *to)?
            }
        })
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Log all matched stubs
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log unmatched requests
    #[serde(default = "default_true")]
    pub log_unmatched: bool,

    /// Content type for stubs that declare none
    #[serde(default = "default_content_type")]
    pub default_content_type: String,
}

fn default_true() -> bool {
    true
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
            default_content_type: default_content_type(),
        }
    }
}

fn default_content_type() -> String {
    crate::response::DEFAULT_CONTENT_TYPE.to_string()
}
