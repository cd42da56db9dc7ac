//! Incremental request body assembly
//!
//! One [`BodyAssembler`] lives on each connection. It is primed with the
//! request head, fed body chunks as they arrive and told when the body ends.
//! Decoded fields and files are merged into the [`RequestContext`] as soon as
//! each one completes.
//!
//! # Phases
//!
//! ```text
//! NoBody                      (GET, DELETE, ...)
//! AwaitingDecoder -> Streaming -> Complete
//!                          \-> Failed
//! ```

pub mod form;
pub mod multipart;
pub mod urlencoded;

pub use form::{FileUpload, FormFields, FormValue, UploadStorage};
pub use multipart::{MultipartDecoder, Part};
pub use urlencoded::UrlEncodedDecoder;

use std::sync::Arc;

use crate::config::FilesConfig;
use crate::context::RequestContext;
use crate::http::constants::content_types;
use crate::http::{HttpRequest, MediaType, StatusCode};

/// Body assembly errors
#[derive(thiserror::Error, Debug)]
pub enum AssemblyError {
    /// The declared content type cannot be decoded (e.g. multipart without a boundary)
    #[error("Incompatible request body: {0}")]
    Incompatible(String),
    #[error("Malformed request body: {0}")]
    Decode(String),
    #[error("Request body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AssemblyError {
    /// Status written back to the client
    pub fn status(&self) -> StatusCode {
        match self {
            AssemblyError::Incompatible(_) | AssemblyError::Decode(_) => StatusCode::BadRequest,
            AssemblyError::TooLarge { .. } => StatusCode::PayloadTooLarge,
            AssemblyError::Io(_) => StatusCode::InternalServerError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyPhase {
    /// The verb carries no form body; chunks are ignored
    NoBody,
    AwaitingDecoder,
    Streaming,
    Complete,
    Failed,
}

enum BodyDecoder {
    UrlEncoded(UrlEncodedDecoder),
    Multipart(MultipartDecoder),
    /// Bytes kept verbatim as the request body
    Raw,
}

pub struct BodyAssembler {
    config: Arc<FilesConfig>,
    phase: AssemblyPhase,
    decoder: Option<BodyDecoder>,
    content_type: Option<MediaType>,
    multipart: bool,
    chunked: bool,
    received: usize,
}

impl BodyAssembler {
    pub fn new(config: Arc<FilesConfig>) -> Self {
        Self {
            config,
            phase: AssemblyPhase::NoBody,
            decoder: None,
            content_type: None,
            multipart: false,
            chunked: false,
            received: 0,
        }
    }

    /// Prime the assembler with a freshly parsed request head
    pub fn begin(&mut self, request: &HttpRequest) {
        self.reset();
        self.chunked = request.is_chunked();
        if request.method().permits_body() {
            self.content_type = request.content_type();
            self.phase = AssemblyPhase::AwaitingDecoder;
        }
    }

    /// Feed one body chunk, merging every completed field or file into `ctx`
    pub fn offer(&mut self, chunk: &[u8], ctx: &mut RequestContext) -> Result<(), AssemblyError> {
        match self.phase {
            AssemblyPhase::NoBody | AssemblyPhase::Complete | AssemblyPhase::Failed => {
                return Ok(())
            }
            AssemblyPhase::AwaitingDecoder => self.start_decoder()?,
            AssemblyPhase::Streaming => {}
        }

        self.received += chunk.len();
        if self.received > self.config.max_body_size {
            return self.fail(AssemblyError::TooLarge { limit: self.config.max_body_size });
        }

        let result = match &mut self.decoder {
            Some(BodyDecoder::UrlEncoded(decoder)) => decoder.offer(chunk).map(|pairs| {
                pairs.into_iter().for_each(|(name, value)| ctx.add_field(&name, value));
            }),
            Some(BodyDecoder::Multipart(decoder)) => {
                decoder.offer(chunk).map(|parts| merge_parts(parts, ctx))
            }
            Some(BodyDecoder::Raw) => {
                ctx.append_body(chunk);
                Ok(())
            }
            None => Ok(()),
        };
        result.or_else(|e| self.fail(e))
    }

    /// Handle the terminal marker. Returns `true` only on the call that
    /// completed the body; redundant terminal events return `false`.
    pub fn finish(&mut self, ctx: &mut RequestContext) -> Result<bool, AssemblyError> {
        match self.phase {
            AssemblyPhase::NoBody | AssemblyPhase::Complete | AssemblyPhase::Failed => {
                return Ok(false)
            }
            AssemblyPhase::AwaitingDecoder => self.start_decoder()?,
            AssemblyPhase::Streaming => {}
        }

        let result = match &mut self.decoder {
            Some(BodyDecoder::UrlEncoded(decoder)) => decoder.finish().map(|pairs| {
                pairs.into_iter().for_each(|(name, value)| ctx.add_field(&name, value));
            }),
            Some(BodyDecoder::Multipart(decoder)) => {
                decoder.finish().map(|parts| merge_parts(parts, ctx))
            }
            Some(BodyDecoder::Raw) | None => Ok(()),
        };
        result.or_else(|e| self.fail(e))?;

        self.decoder = None;
        self.phase = AssemblyPhase::Complete;
        log::debug!(
            "Request body complete: {} bytes, {} fields, {} files",
            self.received,
            ctx.form().len(),
            ctx.files().len()
        );
        Ok(true)
    }

    /// Drop any decoder state so the connection can take the next request
    pub fn reset(&mut self) {
        self.phase = AssemblyPhase::NoBody;
        self.decoder = None;
        self.content_type = None;
        self.multipart = false;
        self.chunked = false;
        self.received = 0;
    }

    pub fn phase(&self) -> AssemblyPhase {
        self.phase
    }

    pub fn is_multipart(&self) -> bool {
        self.multipart
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    /// Body bytes received so far
    pub fn received(&self) -> usize {
        self.received
    }

    fn start_decoder(&mut self) -> Result<(), AssemblyError> {
        let content_type = self.content_type.clone();
        let decoder = match &content_type {
            Some(media) if media.essence() == content_types::MULTIPART_FORM => {
                let boundary = media.param("boundary").ok_or_else(|| {
                    AssemblyError::Incompatible("multipart body without a boundary".to_string())
                });
                match boundary.and_then(|b| MultipartDecoder::new(b, &self.config)) {
                    Ok(decoder) => {
                        self.multipart = true;
                        BodyDecoder::Multipart(decoder)
                    }
                    Err(e) => return self.fail(e),
                }
            }
            Some(media) if media.essence() == content_types::FORM_URLENCODED => {
                BodyDecoder::UrlEncoded(UrlEncodedDecoder::new())
            }
            None => BodyDecoder::UrlEncoded(UrlEncodedDecoder::new()),
            Some(_) => BodyDecoder::Raw,
        };
        self.decoder = Some(decoder);
        self.phase = AssemblyPhase::Streaming;
        Ok(())
    }

    fn fail<T>(&mut self, error: AssemblyError) -> Result<T, AssemblyError> {
        log::debug!("Request body rejected: {}", error);
        self.decoder = None;
        self.phase = AssemblyPhase::Failed;
        Err(error)
    }
}

fn merge_parts(parts: Vec<Part>, ctx: &mut RequestContext) {
    for part in parts {
        match part {
            Part::Field { name, value } => ctx.add_field(&name, value),
            Part::File(file) => ctx.add_file(file),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, HttpVersion};
    use std::collections::HashMap;

    fn request(method: HttpMethod, content_type: Option<&str>) -> Arc<HttpRequest> {
        let mut headers = HashMap::new();
        if let Some(content_type) = content_type {
            headers.insert("Content-Type".to_string(), content_type.to_string());
        }
        Arc::new(HttpRequest::new(method, "/upload".to_string(), HttpVersion::Http1_1, headers))
    }

    fn assembler(config: FilesConfig) -> BodyAssembler {
        BodyAssembler::new(Arc::new(config))
    }

    #[test]
    fn test_non_body_verbs_skip_assembly() {
        let req = request(HttpMethod::GET, None);
        let mut ctx = RequestContext::new(Arc::clone(&req));
        let mut body = assembler(FilesConfig::default());
        body.begin(&req);

        assert_eq!(body.phase(), AssemblyPhase::NoBody);
        body.offer(b"a=1", &mut ctx).unwrap();
        assert!(!body.finish(&mut ctx).unwrap());
        assert!(ctx.form().is_empty());
    }

    #[test]
    fn test_urlencoded_body_with_nested_fields() {
        let req = request(HttpMethod::POST, Some("application/x-www-form-urlencoded"));
        let mut ctx = RequestContext::new(Arc::clone(&req));
        let mut body = assembler(FilesConfig::default());
        body.begin(&req);
        assert_eq!(body.phase(), AssemblyPhase::AwaitingDecoder);

        body.offer(b"a[x]=1&a", &mut ctx).unwrap();
        assert_eq!(body.phase(), AssemblyPhase::Streaming);
        body.offer(b"[y]=2&name=bo", &mut ctx).unwrap();
        body.offer(b"b", &mut ctx).unwrap();

        assert!(body.finish(&mut ctx).unwrap());
        assert_eq!(body.phase(), AssemblyPhase::Complete);
        assert_eq!(ctx.form().len(), 2);
        let nested = ctx.form().nested("a").unwrap();
        assert_eq!(nested.len(), 2);
        assert_eq!(ctx.form().value("name"), Some("bob"));
    }

    #[test]
    fn test_redundant_terminal_marker_ignored() {
        let req = request(HttpMethod::POST, None);
        let mut ctx = RequestContext::new(Arc::clone(&req));
        let mut body = assembler(FilesConfig::default());
        body.begin(&req);

        body.offer(b"k=v", &mut ctx).unwrap();
        assert!(body.finish(&mut ctx).unwrap());
        assert!(!body.finish(&mut ctx).unwrap());
        assert_eq!(ctx.form().len(), 1);
    }

    #[test]
    fn test_multipart_body() {
        let req = request(HttpMethod::POST, Some("multipart/form-data; boundary=b0und"));
        let mut ctx = RequestContext::new(Arc::clone(&req));
        let mut body = assembler(FilesConfig::default());
        body.begin(&req);

        let raw = b"--b0und\r\nContent-Disposition: form-data; name=\"field\"\r\n\r\nvalue\r\n\
--b0und\r\nContent-Disposition: form-data; name=\"file\"; filename=\"f.txt\"\r\n\r\ncontent\r\n\
--b0und--\r\n";
        for chunk in raw.chunks(5) {
            body.offer(chunk, &mut ctx).unwrap();
        }
        assert!(body.finish(&mut ctx).unwrap());
        assert!(body.is_multipart());

        assert_eq!(ctx.form().len(), 1);
        assert_eq!(ctx.form().value("field"), Some("value"));
        assert_eq!(ctx.files().len(), 1);
        assert_eq!(ctx.files()[0].file_name(), "f.txt");
    }

    #[test]
    fn test_multipart_without_boundary_is_incompatible() {
        let req = request(HttpMethod::POST, Some("multipart/form-data"));
        let mut ctx = RequestContext::new(Arc::clone(&req));
        let mut body = assembler(FilesConfig::default());
        body.begin(&req);

        let err = body.offer(b"--x", &mut ctx).unwrap_err();
        assert!(matches!(err, AssemblyError::Incompatible(_)));
        assert_eq!(err.status(), StatusCode::BadRequest);
        assert_eq!(body.phase(), AssemblyPhase::Failed);
    }

    #[test]
    fn test_raw_body_kept_verbatim() {
        let req = request(HttpMethod::PUT, Some("application/json"));
        let mut ctx = RequestContext::new(Arc::clone(&req));
        let mut body = assembler(FilesConfig::default());
        body.begin(&req);

        body.offer(b"{\"a\":", &mut ctx).unwrap();
        body.offer(b"1}", &mut ctx).unwrap();
        assert!(body.finish(&mut ctx).unwrap());
        assert_eq!(ctx.body(), b"{\"a\":1}");
        assert!(ctx.form().is_empty());
    }

    #[test]
    fn test_body_size_limit() {
        let req = request(HttpMethod::POST, Some("text/plain"));
        let mut ctx = RequestContext::new(Arc::clone(&req));
        let mut body = assembler(FilesConfig { max_body_size: 4, ..Default::default() });
        body.begin(&req);

        body.offer(b"abc", &mut ctx).unwrap();
        let err = body.offer(b"de", &mut ctx).unwrap_err();
        assert_eq!(err.status(), StatusCode::PayloadTooLarge);
        assert!(!body.finish(&mut ctx).unwrap());
    }

    #[test]
    fn test_reset_between_requests() {
        let req = request(HttpMethod::POST, None);
        let mut ctx = RequestContext::new(Arc::clone(&req));
        let mut body = assembler(FilesConfig::default());
        body.begin(&req);
        body.offer(b"a=1", &mut ctx).unwrap();

        body.reset();
        assert_eq!(body.phase(), AssemblyPhase::NoBody);
        assert_eq!(body.received(), 0);
    }
}
