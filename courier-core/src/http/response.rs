//! HTTP response building
//!
//! Responses are built with a fluent API and handed to hyper by
//! [`crate::server`]; the connection headers (`Connection`, `Content-Length`)
//! are settled by the dispatcher once the response is final.

use std::collections::HashMap;

use super::constants::{content_types, headers};
use super::{HttpCookie, HttpError, HttpResult};

/// HTTP status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    // 2xx Success
    Ok = 200,
    Created = 201,
    Accepted = 202,
    NoContent = 204,

    // 3xx Redirection
    MovedPermanently = 301,
    Found = 302,
    SeeOther = 303,
    NotModified = 304,

    // 4xx Client Error
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    NotAcceptable = 406,
    Conflict = 409,
    PayloadTooLarge = 413,
    UnsupportedMediaType = 415,
    UnprocessableEntity = 422,

    // 5xx Server Error
    InternalServerError = 500,
    NotImplemented = 501,
    BadGateway = 502,
    ServiceUnavailable = 503,
}

impl StatusCode {
    /// Get the status code as a number
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Map a numeric code back to a known status
    pub fn from_u16(code: u16) -> Option<Self> {
        let status = match code {
            200 => StatusCode::Ok,
            201 => StatusCode::Created,
            202 => StatusCode::Accepted,
            204 => StatusCode::NoContent,
            301 => StatusCode::MovedPermanently,
            302 => StatusCode::Found,
            303 => StatusCode::SeeOther,
            304 => StatusCode::NotModified,
            400 => StatusCode::BadRequest,
            401 => StatusCode::Unauthorized,
            403 => StatusCode::Forbidden,
            404 => StatusCode::NotFound,
            405 => StatusCode::MethodNotAllowed,
            406 => StatusCode::NotAcceptable,
            409 => StatusCode::Conflict,
            413 => StatusCode::PayloadTooLarge,
            415 => StatusCode::UnsupportedMediaType,
            422 => StatusCode::UnprocessableEntity,
            500 => StatusCode::InternalServerError,
            501 => StatusCode::NotImplemented,
            502 => StatusCode::BadGateway,
            503 => StatusCode::ServiceUnavailable,
            _ => return None,
        };
        Some(status)
    }

    /// Get the reason phrase for this status code
    pub fn reason_phrase(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::Accepted => "Accepted",
            StatusCode::NoContent => "No Content",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::Found => "Found",
            StatusCode::SeeOther => "See Other",
            StatusCode::NotModified => "Not Modified",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::NotAcceptable => "Not Acceptable",
            StatusCode::Conflict => "Conflict",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::UnsupportedMediaType => "Unsupported Media Type",
            StatusCode::UnprocessableEntity => "Unprocessable Entity",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::BadGateway => "Bad Gateway",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }

    pub fn is_redirect(self) -> bool {
        (300..400).contains(&self.as_u16())
    }

    pub fn is_error(self) -> bool {
        self.as_u16() >= 400
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

/// HTTP response builder with fluent API
///
/// Cookies are kept apart from the header map because a response may carry
/// several `Set-Cookie` lines.
///
/// # Example
///
/// ```rust
/// use courier_core::http::{HttpResponse, StatusCode};
///
/// let response = HttpResponse::ok()
///     .header("X-Trace", "1")
///     .json(r#"{"message": "Hello, World!"}"#);
/// assert_eq!(response.status(), StatusCode::Ok);
/// ```
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HashMap<String, String>,
    cookies: Vec<HttpCookie>,
    body: Vec<u8>,
}

impl HttpResponse {
    /// Create a new HTTP response with the given status code
    pub fn new(status: StatusCode) -> Self {
        let mut headers = HashMap::new();
        headers.insert(headers::SERVER.to_string(), "Courier/0.1.0".to_string());

        Self { status, headers, cookies: Vec::new(), body: Vec::new() }
    }

    // Convenience constructors for common status codes

    /// Create a 200 OK response
    pub fn ok() -> Self {
        Self::new(StatusCode::Ok)
    }

    /// Create a 201 Created response
    pub fn created() -> Self {
        Self::new(StatusCode::Created)
    }

    /// Create a 204 No Content response
    pub fn no_content() -> Self {
        Self::new(StatusCode::NoContent)
    }

    /// Create a 400 Bad Request response
    pub fn bad_request() -> Self {
        Self::new(StatusCode::BadRequest)
    }

    /// Create a 404 Not Found response
    pub fn not_found() -> Self {
        Self::new(StatusCode::NotFound)
    }

    /// Create a 406 Not Acceptable response
    pub fn not_acceptable() -> Self {
        Self::new(StatusCode::NotAcceptable)
    }

    /// Create a 500 Internal Server Error response
    pub fn internal_server_error() -> Self {
        Self::new(StatusCode::InternalServerError)
    }

    /// Redirect to another URL
    pub fn redirect(location: &str) -> Self {
        Self::new(StatusCode::Found).header(headers::LOCATION, location)
    }

    // Builder methods

    /// Set a header
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Set the Content-Type header
    pub fn content_type(self, content_type: &str) -> Self {
        self.header(headers::CONTENT_TYPE, content_type)
    }

    /// Set the body as raw bytes
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Set the body as text (UTF-8)
    pub fn text(self, text: &str) -> Self {
        self.content_type(content_types::TEXT).body(text.as_bytes().to_vec())
    }

    /// Set the body as HTML
    pub fn html(self, html: &str) -> Self {
        self.content_type(content_types::HTML).body(html.as_bytes().to_vec())
    }

    /// Set the body as JSON
    pub fn json(self, json: &str) -> Self {
        self.content_type(content_types::JSON).body(json.as_bytes().to_vec())
    }

    /// Set the body as binary data
    pub fn binary(self, data: Vec<u8>) -> Self {
        self.content_type(content_types::BINARY).body(data)
    }

    /// Add a cookie to the response
    pub fn cookie(mut self, cookie: HttpCookie) -> Self {
        self.add_cookie(cookie);
        self
    }

    // In-place mutation, used by transformers and the dispatcher

    /// Set a header, replacing any existing value under the same name
    /// (names compare case-insensitively)
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
        self.headers.insert(name.to_string(), value.to_string());
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn set_body(&mut self, content_type: &str, body: Vec<u8>) {
        self.set_header(headers::CONTENT_TYPE, content_type);
        self.body = body;
    }

    /// Add a cookie; a later cookie with the same name replaces an earlier one
    pub fn add_cookie(&mut self, cookie: HttpCookie) {
        self.cookies.retain(|existing| existing.name() != cookie.name());
        self.cookies.push(cookie);
    }

    // Accessors

    /// Get the status code
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get all headers
    pub fn get_headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Get a specific header (case-insensitive)
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn cookies(&self) -> &[HttpCookie] {
        &self.cookies
    }

    /// Get the response body
    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }

    /// Get the response body as a string (if valid UTF-8)
    pub fn body_string(&self) -> HttpResult<&str> {
        std::str::from_utf8(&self.body)
            .map_err(|e| HttpError::InvalidRequest(format!("Body is not valid UTF-8: {}", e)))
    }

    /// Take the body out, leaving an empty one
    pub fn take_body(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.body)
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::ok()
    }
}
