//! Per-request dispatch state

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::body::{FileUpload, FormFields};
use crate::http::{HttpCookie, HttpRequest, MediaType, QueryParams};
use crate::routing::{PathParams, Route, RouteMatch};
use crate::session::SessionHandle;

/// The template a request matched together with the concrete path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPath {
    pub template: String,
    pub path: String,
    pub params: PathParams,
}

/// Everything known about one in-flight request.
///
/// Created when the head is parsed, filled by the body assembler, read by
/// parameter resolution and dropped once the response is written.
#[derive(Debug)]
pub struct RequestContext {
    request: Arc<HttpRequest>,
    route: Option<Arc<Route>>,
    path_params: PathParams,
    media_type: MediaType,
    form: FormFields,
    files: Vec<Arc<FileUpload>>,
    body: BytesMut,
    session: Option<SessionHandle>,
}

impl RequestContext {
    pub fn new(request: Arc<HttpRequest>) -> Self {
        Self {
            request,
            route: None,
            path_params: PathParams::new(),
            media_type: MediaType::any(),
            form: FormFields::new(),
            files: Vec::new(),
            body: BytesMut::new(),
            session: None,
        }
    }

    /// Context for a request the registry matched
    pub fn matched(request: Arc<HttpRequest>, found: RouteMatch) -> Self {
        let mut ctx = Self::new(request);
        ctx.route = Some(found.route);
        ctx.path_params = found.params;
        ctx.media_type = found.media_type;
        ctx
    }

    pub fn request(&self) -> &Arc<HttpRequest> {
        &self.request
    }

    pub fn route(&self) -> Option<&Arc<Route>> {
        self.route.as_ref()
    }

    pub fn path(&self) -> &str {
        self.request.path()
    }

    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(|s| s.as_str())
    }

    pub fn query(&self) -> &QueryParams {
        self.request.query_params()
    }

    pub fn cookies(&self) -> &HashMap<String, HttpCookie> {
        self.request.cookies()
    }

    /// Negotiated response media type
    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    pub fn form(&self) -> &FormFields {
        &self.form
    }

    pub fn files(&self) -> &[Arc<FileUpload>] {
        &self.files
    }

    /// Raw body bytes (content types without a form decoder)
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.body)
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    pub fn matched_path(&self) -> MatchedPath {
        MatchedPath {
            template: self.route.as_ref().map(|r| r.template().to_string()).unwrap_or_default(),
            path: self.request.path().to_string(),
            params: self.path_params.clone(),
        }
    }

    // Mutation, used while assembling the body and before invocation

    pub fn add_field(&mut self, name: &str, value: String) {
        self.form.insert(name, value);
    }

    pub fn add_file(&mut self, file: FileUpload) {
        self.files.push(Arc::new(file));
    }

    pub fn append_body(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
    }

    pub fn set_session(&mut self, session: SessionHandle) {
        self.session = Some(session);
    }
}
