//! HTTP primitives shared by the dispatch core
//!
//! The wire itself is handled by hyper (see [`crate::server`]); this module
//! holds the protocol-level types the router, the body assembler and the
//! transformers work with.
//!
//! # Architecture
//!
//! - [`request`] - request head, query and cookie parsing
//! - [`response`] - response building
//! - [`media`] - media types and `Accept` negotiation
//! - [`cookie`] - request and response cookies

pub mod cookie;
pub mod media;
pub mod request;
pub mod response;

pub use cookie::HttpCookie;
pub use media::MediaType;
pub use request::{Headers, HttpMethod, HttpRequest, HttpVersion, QueryParams};
pub use response::{HttpResponse, StatusCode};

/// Result type for HTTP operations
pub type HttpResult<T> = std::result::Result<T, HttpError>;

/// HTTP-specific error types
#[derive(Debug, Clone)]
pub enum HttpError {
    /// Invalid HTTP request format
    InvalidRequest(String),
    /// Unsupported HTTP method
    UnsupportedMethod(String),
    /// Invalid HTTP headers
    InvalidHeaders(String),
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::InvalidRequest(msg) => write!(f, "Invalid HTTP request: {}", msg),
            HttpError::UnsupportedMethod(method) => {
                write!(f, "Unsupported HTTP method: {}", method)
            }
            HttpError::InvalidHeaders(msg) => write!(f, "Invalid headers: {}", msg),
        }
    }
}

impl std::error::Error for HttpError {}

// Convert HTTP errors to main framework errors
impl From<HttpError> for crate::Error {
    fn from(err: HttpError) -> Self {
        crate::Error::HttpError(err.to_string())
    }
}

/// HTTP/1.1 protocol constants
pub mod constants {
    /// Common HTTP headers
    pub mod headers {
        pub const CONTENT_TYPE: &str = "Content-Type";
        pub const CONTENT_LENGTH: &str = "Content-Length";
        pub const CONNECTION: &str = "Connection";
        pub const LOCATION: &str = "Location";
        pub const SET_COOKIE: &str = "Set-Cookie";
        pub const SERVER: &str = "Server";
    }

    /// Common content types
    pub mod content_types {
        pub const JSON: &str = "application/json";
        pub const HTML: &str = "text/html; charset=utf-8";
        pub const TEXT: &str = "text/plain; charset=utf-8";
        pub const BINARY: &str = "application/octet-stream";
        pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
        pub const MULTIPART_FORM: &str = "multipart/form-data";
    }
}

/// Percent-decode one `application/x-www-form-urlencoded` component.
///
/// `+` is a space. Returns `None` when the decoded bytes are not UTF-8.
pub fn decode_component(raw: &[u8]) -> Option<String> {
    let spaced: Vec<u8> = raw.iter().map(|b| if *b == b'+' { b' ' } else { *b }).collect();
    let decoded = urlencoding::decode_binary(&spaced);
    String::from_utf8(decoded.into_owned()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_component() {
        assert_eq!(decode_component(b"a+b%20c").as_deref(), Some("a b c"));
        assert_eq!(decode_component(b"%E2%9C%93").as_deref(), Some("\u{2713}"));
        assert_eq!(decode_component(b"%FF"), None);
        // malformed escapes are kept verbatim
        assert_eq!(decode_component(b"100%").as_deref(), Some("100%"));
    }
}
