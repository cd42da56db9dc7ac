//! Handlers and what they return

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::http::{HttpCookie, HttpResponse, StatusCode};
use crate::params::Args;
use crate::transform::Payload;

pub type HandlerResult = anyhow::Result<Reply>;

/// Application code bound to a route
pub trait Handler: Send + Sync {
    fn call(&self, args: Args) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(Args) -> HandlerResult + Send + Sync,
{
    fn call(&self, args: Args) -> HandlerResult {
        self(args)
    }
}

/// What a handler produced
#[derive(Debug)]
pub enum Reply {
    /// A value for the transformer chain
    Value(Payload),
    /// A complete response; bypasses the transformers
    Response(HttpResponse),
    /// An expected failure, rendered by the error transformers
    Failure(WebFailure),
    /// The handler kept its [`ResponsePusher`] and answers later
    Deferred,
}

impl Reply {
    pub fn empty() -> Self {
        Reply::Value(Payload::Empty)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Reply::Value(Payload::Text(text.into()))
    }

    pub fn json(value: serde_json::Value) -> Self {
        Reply::Value(Payload::Json(value))
    }

    /// Serialize any value into a JSON payload
    pub fn serialize<T: Serialize>(value: &T) -> anyhow::Result<Self> {
        Ok(Reply::Value(Payload::Json(serde_json::to_value(value)?)))
    }

    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        Reply::Value(Payload::Bytes(bytes.into()))
    }

    /// A value only an application transformer knows how to render
    pub fn custom<T: Send + 'static>(value: T) -> Self {
        Reply::Value(Payload::Custom(Box::new(value)))
    }

    pub fn response(response: HttpResponse) -> Self {
        Reply::Response(response)
    }

    pub fn failure(status: StatusCode, message: impl Into<String>) -> Self {
        Reply::Failure(WebFailure::new(status, message))
    }

    pub fn deferred() -> Self {
        Reply::Deferred
    }
}

/// An HTTP-level failure raised by application code.
///
/// Returned as `Err(WebFailure.into())` from a handler it is recognized
/// and rendered with its own status instead of a 500.
#[derive(Debug, Clone, PartialEq)]
pub struct WebFailure {
    pub status: StatusCode,
    pub message: String,
    /// Optional name of a template an application error transformer may use
    pub template: Option<String>,
}

impl WebFailure {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), template: None }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BadRequest, message)
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }
}

impl fmt::Display for WebFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for WebFailure {}

#[derive(Debug, Default)]
struct StagedResponse {
    status: Option<StatusCode>,
    headers: Vec<(String, String)>,
    cookies: Vec<HttpCookie>,
    redirect: Option<(StatusCode, String)>,
}

/// Response adjustments a handler stages while it runs.
///
/// Status, headers and cookies are applied to whatever the transformer chain
/// renders. A redirect replaces the rendered response.
#[derive(Debug, Clone, Default)]
pub struct ResponseHandle {
    staged: Arc<Mutex<StagedResponse>>,
}

impl ResponseHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn staged(&self) -> std::sync::MutexGuard<'_, StagedResponse> {
        self.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_status(&self, status: StatusCode) {
        self.staged().status = Some(status);
    }

    pub fn set_header(&self, name: &str, value: &str) {
        let mut staged = self.staged();
        staged.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        staged.headers.push((name.to_string(), value.to_string()));
    }

    pub fn add_cookie(&self, cookie: HttpCookie) {
        self.staged().cookies.push(cookie);
    }

    /// Answer with a `303 See Other` to `location`
    pub fn redirect(&self, location: &str) {
        self.redirect_with(StatusCode::SeeOther, location);
    }

    pub fn redirect_with(&self, status: StatusCode, location: &str) {
        self.staged().redirect = Some((status, location.to_string()));
    }

    pub fn is_redirect(&self) -> bool {
        self.staged().redirect.is_some()
    }

    /// The staged redirect as a complete response, if any
    pub(crate) fn redirect_response(&self) -> Option<HttpResponse> {
        let staged = self.staged();
        let (status, location) = staged.redirect.as_ref()?;
        let mut response = HttpResponse::redirect(location);
        response.set_status(*status);
        Some(response)
    }

    /// Apply staged headers and cookies (and the status, if asked) to `response`
    pub fn apply_to(&self, response: &mut HttpResponse, include_status: bool) {
        let staged = self.staged();
        if include_status {
            if let Some(status) = staged.status {
                response.set_status(status);
            }
        }
        for (name, value) in &staged.headers {
            response.set_header(name, value);
        }
        for cookie in &staged.cookies {
            response.add_cookie(cookie.clone());
        }
    }
}

/// Lets a handler answer after it returned [`Reply::Deferred`].
///
/// The first push wins; later pushes are ignored.
#[derive(Clone)]
pub struct ResponsePusher {
    sender: Arc<Mutex<Option<oneshot::Sender<Reply>>>>,
}

impl ResponsePusher {
    /// A pusher and the receiving end the dispatcher waits on
    pub fn channel() -> (Self, oneshot::Receiver<Reply>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender: Arc::new(Mutex::new(Some(sender))) }, receiver)
    }

    /// A pusher nobody listens to
    pub fn detached() -> Self {
        Self { sender: Arc::new(Mutex::new(None)) }
    }

    /// Deliver the reply. Returns false if one was already pushed or the
    /// request is gone.
    pub fn push(&self, reply: Reply) -> bool {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        match sender {
            Some(sender) => sender.send(reply).is_ok(),
            None => false,
        }
    }

    pub fn is_pushed(&self) -> bool {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }
}

impl fmt::Debug for ResponsePusher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponsePusher").field("pushed", &self.is_pushed()).finish()
    }
}
