//! Built-in success transformers

use super::{Payload, TransformContext, TransformError, Transformer};
use crate::http::constants::content_types;
use crate::http::{HttpResponse, MediaType, StatusCode};

/// `Payload::Empty` → 204 without a body
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyTransformer;

impl Transformer for EmptyTransformer {
    fn name(&self) -> &str {
        "empty"
    }

    fn priority(&self) -> i32 {
        40
    }

    fn can_transform(&self, value: &Payload, _: &TransformContext<'_>) -> bool {
        matches!(value, Payload::Empty)
    }

    fn transform(
        &self,
        _: Payload,
        _: &TransformContext<'_>,
        response: &mut HttpResponse,
    ) -> Result<(), TransformError> {
        response.set_status(StatusCode::NoContent);
        Ok(())
    }
}

/// Raw bytes, for any media type. Wildcards are sent as octet-stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesTransformer;

impl Transformer for BytesTransformer {
    fn name(&self) -> &str {
        "bytes"
    }

    fn priority(&self) -> i32 {
        30
    }

    fn can_transform(&self, value: &Payload, cx: &TransformContext<'_>) -> bool {
        matches!(value, Payload::Bytes(_)) && cx.acceptable(&bytes_type(cx.media_type))
    }

    fn transform(
        &self,
        value: Payload,
        cx: &TransformContext<'_>,
        response: &mut HttpResponse,
    ) -> Result<(), TransformError> {
        let Payload::Bytes(bytes) = value else {
            return Err(TransformError::Render("bytes transformer given a non-bytes value".into()));
        };
        let content_type = bytes_type(cx.media_type).to_string();
        response.set_body(&content_type, bytes.to_vec());
        Ok(())
    }
}

fn bytes_type(media: &MediaType) -> MediaType {
    if media.is_wildcard() {
        MediaType::octet_stream()
    } else {
        media.clone()
    }
}

/// Text values as `text/plain`, or `text/html` when that was negotiated
#[derive(Debug, Default, Clone, Copy)]
pub struct TextTransformer;

impl Transformer for TextTransformer {
    fn name(&self) -> &str {
        "text"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn can_transform(&self, value: &Payload, cx: &TransformContext<'_>) -> bool {
        let text_range = cx.media_type.kind() == "text" || cx.media_type.kind() == "*";
        matches!(value, Payload::Text(_)) && text_range && cx.acceptable(&text_type(cx.media_type))
    }

    fn transform(
        &self,
        value: Payload,
        cx: &TransformContext<'_>,
        response: &mut HttpResponse,
    ) -> Result<(), TransformError> {
        let Payload::Text(text) = value else {
            return Err(TransformError::Render("text transformer given a non-text value".into()));
        };
        let content_type = if text_type(cx.media_type) == MediaType::html() {
            content_types::HTML
        } else {
            content_types::TEXT
        };
        response.set_body(content_type, text.into_bytes());
        Ok(())
    }
}

fn text_type(media: &MediaType) -> MediaType {
    if media.essence() == "text/html" {
        MediaType::html()
    } else {
        MediaType::text()
    }
}

/// JSON values for `application/json` (or a range covering it); text values
/// only when JSON was explicitly negotiated
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonTransformer;

impl Transformer for JsonTransformer {
    fn name(&self) -> &str {
        "json"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn can_transform(&self, value: &Payload, cx: &TransformContext<'_>) -> bool {
        let json = MediaType::json();
        let negotiated = match value {
            Payload::Json(_) => cx.media_type.matches(&json),
            Payload::Text(_) => cx.media_type.essence() == content_types::JSON,
            _ => false,
        };
        negotiated && cx.acceptable(&json)
    }

    fn transform(
        &self,
        value: Payload,
        _: &TransformContext<'_>,
        response: &mut HttpResponse,
    ) -> Result<(), TransformError> {
        let body = match value {
            Payload::Json(json) => serde_json::to_vec(&json)?,
            Payload::Text(text) => serde_json::to_vec(&serde_json::Value::String(text))?,
            _ => return Err(TransformError::Render("json transformer given a non-json value".into())),
        };
        response.set_body(content_types::JSON, body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpRequest;
    use bytes::Bytes;

    fn render(transformer: &dyn Transformer, value: Payload, media: &MediaType) -> HttpResponse {
        let request = HttpRequest::parse_head(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let cx = TransformContext { request: &request, media_type: media, route: None };
        assert!(transformer.can_transform(&value, &cx));
        let mut response = HttpResponse::ok();
        transformer.transform(value, &cx, &mut response).unwrap();
        response
    }

    #[test]
    fn test_text_picks_html_when_negotiated() {
        let response = render(&TextTransformer, Payload::Text("<b>hi</b>".into()), &MediaType::html());
        assert_eq!(response.header_value("content-type"), Some(content_types::HTML));

        let response = render(&TextTransformer, Payload::Text("hi".into()), &MediaType::any());
        assert_eq!(response.header_value("content-type"), Some(content_types::TEXT));
    }

    #[test]
    fn test_json_text_only_when_json_negotiated() {
        let request = HttpRequest::parse_head(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let any = MediaType::any();
        let cx = TransformContext { request: &request, media_type: &any, route: None };
        assert!(!JsonTransformer.can_transform(&Payload::Text("x".into()), &cx));
        assert!(JsonTransformer.can_transform(&Payload::Json(serde_json::json!(1)), &cx));

        let response = render(&JsonTransformer, Payload::Text("x".into()), &MediaType::json());
        assert_eq!(response.body_string().unwrap(), "\"x\"");
    }

    #[test]
    fn test_bytes_content_type() {
        let data = Payload::Bytes(Bytes::from_static(b"abc"));
        let response = render(&BytesTransformer, data, &MediaType::any());
        assert_eq!(response.header_value("content-type"), Some(content_types::BINARY));

        let data = Payload::Bytes(Bytes::from_static(b"abc"));
        let response = render(&BytesTransformer, data, &MediaType::new("image", "png"));
        assert_eq!(response.header_value("content-type"), Some("image/png"));
    }

    #[test]
    fn test_refused_types_are_not_rendered() {
        let request = HttpRequest::parse_head(
            b"GET / HTTP/1.1\r\nAccept: text/plain;q=0, application/json;q=0, */*\r\n\r\n",
        )
        .unwrap();
        let any = MediaType::any();
        let cx = TransformContext { request: &request, media_type: &any, route: None };
        assert!(!TextTransformer.can_transform(&Payload::Text("x".into()), &cx));
        assert!(!JsonTransformer.can_transform(&Payload::Json(serde_json::json!(1)), &cx));
        assert!(BytesTransformer.can_transform(&Payload::Bytes(Bytes::from_static(b"x")), &cx));

        let html = MediaType::html();
        let cx = TransformContext { request: &request, media_type: &html, route: None };
        assert!(TextTransformer.can_transform(&Payload::Text("x".into()), &cx));
    }
}
