//! Error transformers: render [`WebFailure`] values

use super::{Payload, TransformContext, TransformError, Transformer};
use crate::dispatch::WebFailure;
use crate::http::constants::content_types;
use crate::http::{HttpResponse, MediaType, StatusCode};

/// `Not Found` → `not_found`
fn error_code(status: StatusCode) -> String {
    status
        .reason_phrase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// `{"error": "not_found", "message": "..."}` for JSON-compatible requests
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonErrorTransformer;

impl Transformer for JsonErrorTransformer {
    fn name(&self) -> &str {
        "json-error"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn can_transform(&self, value: &Payload, cx: &TransformContext<'_>) -> bool {
        let json = MediaType::json();
        matches!(value, Payload::Failure(_)) && cx.media_type.matches(&json) && cx.acceptable(&json)
    }

    fn transform(
        &self,
        value: Payload,
        _: &TransformContext<'_>,
        response: &mut HttpResponse,
    ) -> Result<(), TransformError> {
        let Payload::Failure(failure) = value else {
            return Err(TransformError::Render("json-error transformer given a non-failure".into()));
        };
        let body = serde_json::json!({
            "error": error_code(failure.status),
            "message": failure.message,
        });
        response.set_status(failure.status);
        response.set_body(content_types::JSON, serde_json::to_vec(&body)?);
        Ok(())
    }
}

/// Plain-text fallback for every failure
#[derive(Debug, Default, Clone, Copy)]
pub struct TextErrorTransformer;

impl Transformer for TextErrorTransformer {
    fn name(&self) -> &str {
        "text-error"
    }

    fn can_transform(&self, value: &Payload, _: &TransformContext<'_>) -> bool {
        matches!(value, Payload::Failure(_))
    }

    fn transform(
        &self,
        value: Payload,
        _: &TransformContext<'_>,
        response: &mut HttpResponse,
    ) -> Result<(), TransformError> {
        let Payload::Failure(WebFailure { status, message, .. }) = value else {
            return Err(TransformError::Render("text-error transformer given a non-failure".into()));
        };
        response.set_status(status);
        response.set_body(content_types::TEXT, format!("{}: {}", status, message).into_bytes());
        Ok(())
    }
}
