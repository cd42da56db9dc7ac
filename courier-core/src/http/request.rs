//! HTTP request head parsing and representation
//!
//! A request here is the head only (request line, headers, query, cookies).
//! Body bytes are streamed through [`crate::body::BodyAssembler`] and never
//! stored on the request.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::{decode_component, HttpCookie, HttpError, HttpResult, MediaType};

/// HTTP methods supported by the server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
}

impl HttpMethod {
    /// Convert method to string
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
        }
    }

    /// Whether requests with this method carry a form body that must be
    /// assembled before the handler runs
    pub fn permits_body(&self) -> bool {
        matches!(self, HttpMethod::POST | HttpMethod::PUT | HttpMethod::PATCH)
    }
}

impl FromStr for HttpMethod {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::GET),
            "POST" => Ok(HttpMethod::POST),
            "PUT" => Ok(HttpMethod::PUT),
            "DELETE" => Ok(HttpMethod::DELETE),
            "PATCH" => Ok(HttpMethod::PATCH),
            "HEAD" => Ok(HttpMethod::HEAD),
            "OPTIONS" => Ok(HttpMethod::OPTIONS),
            _ => Err(HttpError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP version information
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpVersion {
    Http1_0,
    Http1_1,
}

impl HttpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVersion::Http1_0 => "HTTP/1.0",
            HttpVersion::Http1_1 => "HTTP/1.1",
        }
    }
}

impl FromStr for HttpVersion {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTTP/1.0" => Ok(HttpVersion::Http1_0),
            "HTTP/1.1" => Ok(HttpVersion::Http1_1),
            _ => Err(HttpError::InvalidRequest(format!("Unsupported HTTP version: {}", s))),
        }
    }
}

impl std::fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed query parameters; repeated keys keep every value in order
pub type QueryParams = HashMap<String, Vec<String>>;

/// HTTP headers collection (lowercase names)
pub type Headers = HashMap<String, String>;

/// The head of an HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: HttpMethod,
    uri: String,
    path: String,
    query_params: QueryParams,
    version: HttpVersion,
    headers: Headers,
    cookies: HashMap<String, HttpCookie>,
    remote_addr: Option<SocketAddr>,
    received_at: DateTime<Utc>,
}

impl HttpRequest {
    /// Create a new request head. Header names are lowercased.
    pub fn new(method: HttpMethod, uri: String, version: HttpVersion, headers: Headers) -> Self {
        let headers: Headers =
            headers.into_iter().map(|(name, value)| (name.to_lowercase(), value)).collect();
        let (path, query_params) = Self::parse_path_and_query(&uri);
        let cookies = headers
            .get("cookie")
            .map(|raw| {
                HttpCookie::parse_header(raw)
                    .into_iter()
                    .map(|cookie| (cookie.name().to_string(), cookie))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            method,
            uri,
            path,
            query_params,
            version,
            headers,
            cookies,
            remote_addr: None,
            received_at: Utc::now(),
        }
    }

    /// Parse a request head (request line and headers) from raw bytes.
    ///
    /// Anything after the blank line is ignored.
    pub fn parse_head(raw: &[u8]) -> HttpResult<Self> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| HttpError::InvalidRequest(format!("Invalid UTF-8: {}", e)))?;
        let head = text.split("\r\n\r\n").next().unwrap_or_default();

        let mut lines = head.split("\r\n");
        let request_line = lines
            .next()
            .filter(|line| !line.trim().is_empty())
            .ok_or_else(|| HttpError::InvalidRequest("Empty request".to_string()))?;
        let (method, uri, version) = Self::parse_request_line(request_line)?;
        let headers = Self::parse_headers(lines)?;

        Ok(Self::new(method, uri, version, headers))
    }

    /// Parse the HTTP request line (e.g., "GET /path HTTP/1.1")
    fn parse_request_line(line: &str) -> HttpResult<(HttpMethod, String, HttpVersion)> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(HttpError::InvalidRequest(format!("Invalid request line: {}", line)));
        }

        let method = parts[0].parse()?;
        let uri = parts[1].to_string();
        let version = parts[2].parse()?;

        Ok((method, uri, version))
    }

    /// Parse HTTP headers from lines
    fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> HttpResult<Headers> {
        let mut headers = HashMap::new();

        for line in lines {
            if line.is_empty() {
                continue;
            }

            let (name, value) = line.split_once(':').ok_or_else(|| {
                HttpError::InvalidHeaders(format!("Invalid header line: {}", line))
            })?;
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }

        Ok(headers)
    }

    /// Split a request target into path and query parameters
    fn parse_path_and_query(target: &str) -> (String, QueryParams) {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };
        let path = if path.is_empty() { "/".to_string() } else { path.to_string() };

        let mut params: QueryParams = HashMap::new();
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_component(key.as_bytes()).unwrap_or_else(|| key.to_string());
            if key.is_empty() {
                continue;
            }
            let value = decode_component(value.as_bytes()).unwrap_or_else(|| value.to_string());
            params.entry(key).or_default().push(value);
        }

        (path, params)
    }

    // Accessors

    /// Get the HTTP method
    pub fn method(&self) -> &HttpMethod {
        &self.method
    }

    /// The raw request target, query string included
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Get the request path (without query parameters)
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the query parameters
    pub fn query_params(&self) -> &QueryParams {
        &self.query_params
    }

    /// First value of a query parameter
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query_params.get(key).and_then(|values| values.first()).map(|s| s.as_str())
    }

    /// Every value of a query parameter, in request order
    pub fn query_values(&self, key: &str) -> &[String] {
        self.query_params.get(key).map(|values| values.as_slice()).unwrap_or_default()
    }

    /// Get the HTTP version
    pub fn version(&self) -> &HttpVersion {
        &self.version
    }

    /// Get all headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get a specific header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(|s| s.as_str())
    }

    pub fn cookies(&self) -> &HashMap<String, HttpCookie> {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&HttpCookie> {
        self.cookies.get(name)
    }

    /// Parsed `Content-Type`, if present and well formed
    pub fn content_type(&self) -> Option<MediaType> {
        self.header("content-type").and_then(MediaType::parse)
    }

    /// Parsed `Accept` ranges in preference order (empty when absent)
    pub fn accept(&self) -> Vec<MediaType> {
        self.header("accept").map(MediaType::parse_accept).unwrap_or_default()
    }

    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false)
    }

    /// Whether the connection must be closed once the response is written:
    /// an explicit `Connection: close`, or HTTP/1.0 without `keep-alive`.
    pub fn wants_close(&self) -> bool {
        let connection = self.header("connection").map(|v| v.to_ascii_lowercase());
        match connection.as_deref() {
            Some(value) if value.contains("close") => true,
            Some(value) if value.contains("keep-alive") => false,
            _ => self.version == HttpVersion::Http1_0,
        }
    }

    /// Get the remote address (if available)
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Set the remote address
    pub fn set_remote_addr(&mut self, addr: SocketAddr) {
        self.remote_addr = Some(addr);
    }

    /// When the request head was received
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_method_parsing() {
        assert_eq!("GET".parse::<HttpMethod>().unwrap(), HttpMethod::GET);
        assert_eq!("POST".parse::<HttpMethod>().unwrap(), HttpMethod::POST);
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::GET);
        assert!("INVALID".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_body_methods() {
        assert!(HttpMethod::POST.permits_body());
        assert!(HttpMethod::PUT.permits_body());
        assert!(!HttpMethod::GET.permits_body());
        assert!(!HttpMethod::DELETE.permits_body());
    }

    #[test]
    fn test_http_version_parsing() {
        assert_eq!("HTTP/1.1".parse::<HttpVersion>().unwrap(), HttpVersion::Http1_1);
        assert_eq!("HTTP/1.0".parse::<HttpVersion>().unwrap(), HttpVersion::Http1_0);
        assert!("HTTP/2.0".parse::<HttpVersion>().is_err());
    }

    #[test]
    fn test_repeated_query_keys() {
        let (path, params) = HttpRequest::parse_path_and_query("/users?tag=a&tag=b&page=1&q=x+y");
        assert_eq!(path, "/users");
        assert_eq!(params.get("tag"), Some(&vec!["a".to_string(), "b".to_string()]));
        assert_eq!(params.get("q"), Some(&vec!["x y".to_string()]));
    }

    #[test]
    fn test_parse_head() {
        let raw = b"POST /upload?x=1 HTTP/1.1\r\nHost: localhost\r\nCookie: sid=42\r\nContent-Type: text/plain\r\n\r\nbody";
        let request = HttpRequest::parse_head(raw).unwrap();
        assert_eq!(request.method(), &HttpMethod::POST);
        assert_eq!(request.path(), "/upload");
        assert_eq!(request.query_param("x"), Some("1"));
        assert_eq!(request.header("HOST"), Some("localhost"));
        assert_eq!(request.cookie("sid").map(|c| c.value()), Some("42"));
        assert_eq!(request.content_type(), Some(MediaType::text()));
    }

    #[test]
    fn test_empty_request_rejected() {
        assert!(HttpRequest::parse_head(b"\r\n\r\n").is_err());
    }

    #[test]
    fn test_connection_close_rules() {
        let close = HttpRequest::parse_head(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
        assert!(close.wants_close());

        let keep = HttpRequest::parse_head(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert!(!keep.wants_close());

        let old = HttpRequest::parse_head(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert!(old.wants_close());

        let old_keep =
            HttpRequest::parse_head(b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n").unwrap();
        assert!(!old_keep.wants_close());
    }
}
