//! Inbound request types.

use chrono::{DateTime, Utc};
use hyper::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use hyper::{HeaderMap, Method, Uri};
use std::collections::HashMap;

/// Request line and headers as delivered by the transport.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
        }
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Full request target handed to URL constraints.
    pub fn url(&self) -> String {
        self.uri.to_string()
    }

    /// Whether a body follows the head.
    pub fn has_body(&self) -> bool {
        if self.headers.contains_key(TRANSFER_ENCODING) {
            return true;
        }
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|len| len > 0)
            .unwrap_or(false)
    }
}

/// A request that matched a stub, kept for verification.
#[derive(Debug, Clone)]
pub struct ObservedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Raw body, empty when none was sent or it could not be read
    pub body: String,
    /// Decoded query parameters
    pub query: HashMap<String, String>,
    pub received_at: DateTime<Utc>,
}

impl ObservedRequest {
    pub fn new(head: &RequestHead, body: &str) -> Self {
        Self {
            method: head.method.clone(),
            uri: head.uri.clone(),
            headers: head.headers.clone(),
            body: body.to_string(),
            query: parse_query_string(head.uri.query().unwrap_or("")),
            received_at: Utc::now(),
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// First value of a header, if it is valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Parse a query string into key-value pairs.
pub(crate) fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        if let Some((key, value)) = part.split_once('=') {
            params.insert(urlencoding_decode(key), urlencoding_decode(value));
        } else {
            params.insert(urlencoding_decode(part), String::new());
        }
    }

    params
}

/// Percent-decoding, with `+` as space. Invalid escapes are kept verbatim.
fn urlencoding_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                match decoded {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string("foo=bar&baz=qux");
        assert_eq!(params.get("foo"), Some(&"bar".to_string()));
        assert_eq!(params.get("baz"), Some(&"qux".to_string()));

        let params = parse_query_string("name=John%20Doe&flag&q=a+b");
        assert_eq!(params.get("name"), Some(&"John Doe".to_string()));
        assert_eq!(params.get("flag"), Some(&String::new()));
        assert_eq!(params.get("q"), Some(&"a b".to_string()));
    }

    #[test]
    fn test_decode_keeps_invalid_escapes() {
        assert_eq!(urlencoding_decode("100%"), "100%");
        assert_eq!(urlencoding_decode("%zz1"), "%zz1");
        assert_eq!(urlencoding_decode("caf%C3%A9"), "café");
    }

    #[test]
    fn test_has_body() {
        let mut head = RequestHead::new(Method::POST, Uri::from_static("/upload"));
        assert!(!head.has_body());

        head.headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
        assert!(!head.has_body());

        head.headers.insert(CONTENT_LENGTH, HeaderValue::from_static("12"));
        assert!(head.has_body());

        let mut chunked = RequestHead::new(Method::POST, Uri::from_static("/upload"));
        chunked
            .headers
            .insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        assert!(chunked.has_body());
    }

    #[test]
    fn test_observed_request_snapshot() {
        let mut head = RequestHead::new(Method::GET, Uri::from_static("/search?q=rust&page=2"));
        head.headers
            .insert("x-request-id", HeaderValue::from_static("abc"));

        let observed = ObservedRequest::new(&head, "payload");
        assert_eq!(observed.method, Method::GET);
        assert_eq!(observed.path(), "/search");
        assert_eq!(observed.body, "payload");
        assert_eq!(observed.query.get("page"), Some(&"2".to_string()));
        assert_eq!(observed.header("x-request-id"), Some("abc"));
        assert_eq!(head.url(), "/search?q=rust&page=2");
    }
}
