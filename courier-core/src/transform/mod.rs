//! Response transformers
//!
//! A handler's value is rendered by the first transformer, in priority
//! order, that can render it for the negotiated media type. On routes that
//! declare no `produces` types the client's other accepted ranges are tried
//! next, in preference order. When nothing fits, the request is answered
//! with `406 Not Acceptable`. Failures go through a
//! second chain built from error transformers.

mod builtin;
mod error;

pub use builtin::{BytesTransformer, EmptyTransformer, JsonTransformer, TextTransformer};
pub use error::{JsonErrorTransformer, TextErrorTransformer};

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::dispatch::WebFailure;
use crate::http::{HttpRequest, HttpResponse, MediaType};
use crate::routing::Route;

/// A handler's return value on its way to the wire
pub enum Payload {
    /// Nothing to send (204)
    Empty,
    Text(String),
    Json(serde_json::Value),
    Bytes(Bytes),
    Failure(WebFailure),
    /// Application types rendered by application transformers
    Custom(Box<dyn Any + Send>),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Empty => "empty",
            Payload::Text(_) => "text",
            Payload::Json(_) => "json",
            Payload::Bytes(_) => "bytes",
            Payload::Failure(_) => "failure",
            Payload::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Empty => f.write_str("Empty"),
            Payload::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Payload::Json(json) => f.debug_tuple("Json").field(json).finish(),
            Payload::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Payload::Failure(failure) => f.debug_tuple("Failure").field(failure).finish(),
            Payload::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// What a transformer may look at besides the value itself
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub request: &'a HttpRequest,
    pub media_type: &'a MediaType,
    pub route: Option<&'a Route>,
}

impl TransformContext<'_> {
    /// Whether the client's `Accept` header allows `media`
    pub fn acceptable(&self, media: &MediaType) -> bool {
        MediaType::quality_in(&self.request.accept(), media) > 0.0
    }

    /// Media types to try, best first: the negotiated one, then (unless the
    /// route pinned its output types) every other range the client accepts.
    fn candidates(&self) -> Vec<MediaType> {
        let mut candidates = vec![self.media_type.clone()];
        if self.route.is_some_and(|route| !route.produces().is_empty()) {
            return candidates;
        }
        for range in self.request.accept().into_iter().filter(MediaType::is_acceptable) {
            let range = MediaType::new(range.kind(), range.subtype());
            if !candidates.contains(&range) {
                candidates.push(range);
            }
        }
        candidates
    }
}

/// Transformer errors
#[derive(thiserror::Error, Debug)]
pub enum TransformError {
    #[error("No transformer accepts the value for the negotiated media type")]
    NotAcceptable,
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Render error: {0}")]
    Render(String),
}

/// Renders values of some kind into a response
pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;

    /// Higher priorities are asked first
    fn priority(&self) -> i32 {
        0
    }

    fn can_transform(&self, value: &Payload, cx: &TransformContext<'_>) -> bool;

    /// Write `value` into `response`. Only called after `can_transform`
    /// answered true for the same value.
    fn transform(
        &self,
        value: Payload,
        cx: &TransformContext<'_>,
        response: &mut HttpResponse,
    ) -> Result<(), TransformError>;
}

/// Transformers sorted by priority (descending); equal priorities keep
/// registration order.
#[derive(Clone, Default)]
pub struct TransformerChain {
    transformers: Vec<Arc<dyn Transformer>>,
}

impl TransformerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty, bytes, text and JSON renderers
    pub fn with_defaults() -> Self {
        let mut chain = Self::new();
        chain.register(EmptyTransformer);
        chain.register(BytesTransformer);
        chain.register(TextTransformer);
        chain.register(JsonTransformer);
        chain
    }

    /// JSON error bodies with a plain-text fallback
    pub fn error_defaults() -> Self {
        let mut chain = Self::new();
        chain.register(JsonErrorTransformer);
        chain.register(TextErrorTransformer);
        chain
    }

    pub fn register<T: Transformer + 'static>(&mut self, transformer: T) {
        self.register_arc(Arc::new(transformer));
    }

    pub fn register_arc(&mut self, transformer: Arc<dyn Transformer>) {
        log::debug!(
            "Transformer '{}' registered (priority {})",
            transformer.name(),
            transformer.priority()
        );
        self.transformers.push(transformer);
        self.transformers.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.transformers.iter().map(|t| t.name()).collect()
    }

    /// Render with the first transformer that accepts the value, trying each
    /// candidate media type in turn
    pub fn render(
        &self,
        value: Payload,
        cx: &TransformContext<'_>,
    ) -> Result<HttpResponse, TransformError> {
        let candidates = cx.candidates();
        let (transformer, media_type) = candidates
            .iter()
            .find_map(|media| {
                let attempt = TransformContext { media_type: media, ..*cx };
                self.transformers
                    .iter()
                    .find(|t| t.can_transform(&value, &attempt))
                    .map(|t| (t, media))
            })
            .ok_or(TransformError::NotAcceptable)?;

        log::trace!(
            "Rendering {} payload as {} with '{}'",
            value.kind(),
            media_type,
            transformer.name()
        );
        let mut response = HttpResponse::ok();
        let cx = TransformContext { media_type, ..*cx };
        transformer.transform(value, &cx, &mut response)?;
        Ok(response)
    }
}

impl fmt::Debug for TransformerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformerChain").field("transformers", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        name: &'static str,
        priority: i32,
        accepts: bool,
        asked: Arc<AtomicUsize>,
    }

    impl Transformer for Counting {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn can_transform(&self, _: &Payload, _: &TransformContext<'_>) -> bool {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.accepts
        }

        fn transform(
            &self,
            _: Payload,
            _: &TransformContext<'_>,
            response: &mut HttpResponse,
        ) -> Result<(), TransformError> {
            response.set_body("text/plain", self.name.as_bytes().to_vec());
            Ok(())
        }
    }

    fn counting(name: &'static str, priority: i32, accepts: bool) -> (Counting, Arc<AtomicUsize>) {
        let asked = Arc::new(AtomicUsize::new(0));
        (Counting { name, priority, accepts, asked: Arc::clone(&asked) }, asked)
    }

    fn request() -> HttpRequest {
        HttpRequest::parse_head(b"GET / HTTP/1.1\r\n\r\n").unwrap()
    }

    #[test]
    fn test_first_accepting_transformer_wins() {
        let (low, low_asked) = counting("low", 1, true);
        let (high, high_asked) = counting("high", 5, true);
        let (tie, _) = counting("tie", 5, true);
        let mut chain = TransformerChain::new();
        chain.register(low);
        chain.register(high);
        chain.register(tie);
        assert_eq!(chain.names(), vec!["high", "tie", "low"]);

        let req = request();
        let media = MediaType::any();
        let cx = TransformContext { request: &req, media_type: &media, route: None };
        let response = chain.render(Payload::Empty, &cx).unwrap();

        assert_eq!(response.body_string().unwrap(), "high");
        assert_eq!(high_asked.load(Ordering::SeqCst), 1);
        assert_eq!(low_asked.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_accepting_transformer_is_not_acceptable() {
        let (refuses, _) = counting("refuses", 0, false);
        let mut chain = TransformerChain::new();
        chain.register(refuses);

        let req = request();
        let media = MediaType::json();
        let cx = TransformContext { request: &req, media_type: &media, route: None };
        assert!(matches!(
            chain.render(Payload::Text("x".into()), &cx),
            Err(TransformError::NotAcceptable)
        ));
    }

    #[test]
    fn test_default_chain() {
        let chain = TransformerChain::with_defaults();
        let req = request();

        let json = MediaType::json();
        let cx = TransformContext { request: &req, media_type: &json, route: None };
        let response = chain.render(Payload::Json(serde_json::json!({"ok": true})), &cx).unwrap();
        assert_eq!(response.body_string().unwrap(), r#"{"ok":true}"#);

        let response = chain.render(Payload::Empty, &cx).unwrap();
        assert_eq!(response.status(), StatusCode::NoContent);

        let png = MediaType::new("image", "png");
        let cx = TransformContext { request: &req, media_type: &png, route: None };
        assert!(chain.render(Payload::Text("hi".into()), &cx).is_err());
        assert!(chain.render(Payload::Bytes(Bytes::from_static(b"\x89PNG")), &cx).is_ok());
    }

    const BROWSER: &[u8] =
        b"GET / HTTP/1.1\r\nAccept: text/html,application/xhtml+xml,*/*;q=0.8\r\n\r\n";

    #[test]
    fn test_falls_back_to_wildcard_range() {
        let chain = TransformerChain::with_defaults();
        let req = HttpRequest::parse_head(BROWSER).unwrap();
        let html = MediaType::html();
        let cx = TransformContext { request: &req, media_type: &html, route: None };

        let response = chain.render(Payload::Json(serde_json::json!({"ok": true})), &cx).unwrap();
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.header_value("content-type"), Some("application/json"));

        let response = chain.render(Payload::Text("<p>hi</p>".into()), &cx).unwrap();
        assert_eq!(response.header_value("content-type"), Some("text/html; charset=utf-8"));
    }

    #[test]
    fn test_refused_json_is_not_acceptable() {
        let chain = TransformerChain::with_defaults();
        let req =
            HttpRequest::parse_head(b"GET / HTTP/1.1\r\nAccept: application/json;q=0\r\n\r\n").unwrap();
        let any = MediaType::any();
        let cx = TransformContext { request: &req, media_type: &any, route: None };
        assert!(matches!(
            chain.render(Payload::Json(serde_json::json!({"ok": true})), &cx),
            Err(TransformError::NotAcceptable)
        ));
    }

    #[test]
    fn test_declared_produces_pins_the_media_type() {
        let route = Route::builder("/page")
            .get()
            .produces("text/html")
            .handler(|_| Ok(crate::dispatch::Reply::text("x")))
            .build()
            .unwrap();
        let chain = TransformerChain::with_defaults();
        let req = HttpRequest::parse_head(BROWSER).unwrap();
        let html = MediaType::html();
        let cx = TransformContext { request: &req, media_type: &html, route: Some(&route) };
        assert!(chain.render(Payload::Json(serde_json::json!(1)), &cx).is_err());
    }
}
