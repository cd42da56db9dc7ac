//! Request dispatch
//!
//! The [`Dispatcher`] owns everything shared by all connections: the frozen
//! route table, both transformer chains, the session store and the
//! collaborators. Per request it is driven through three steps, split so
//! the blocking part can run off the connection's I/O path:
//!
//! 1. [`Dispatcher::admit`] matches the request (or answers it right away:
//!    fallback or 404).
//! 2. [`Dispatcher::invoke`] resolves the arguments, calls the handler
//!    exactly once and renders the reply.
//! 3. [`Dispatcher::finalize`] sets the framing headers, after which the
//!    server records the access entry.
//!
//! Handlers returning [`Reply::Deferred`] hand back a [`DeferredReply`]
//! that completes once the handler pushes through its [`ResponsePusher`].

mod error;
mod handler;

pub use error::DispatchError;
pub use handler::{Handler, HandlerResult, Reply, ResponseHandle, ResponsePusher, WebFailure};

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::config::{CourierConfig, FilesConfig, SessionsConfig};
use crate::context::RequestContext;
use crate::http::constants::headers;
use crate::http::{HttpCookie, HttpRequest, HttpResponse, MediaType, StatusCode};
use crate::logging::{AccessEntry, AccessLog, LogAccessLog};
use crate::params::{self, Args, InvocationScope};
use crate::routing::{Fallback, RequestDescriptor, Route, RouteBuilder, RouteError, RouteRegistry, Scope};
use crate::session::{MemorySessionStore, SessionHandle, SessionStore};
use crate::transform::{Payload, TransformContext, TransformError, Transformer, TransformerChain};

/// Outcome of matching a request head
#[derive(Debug)]
pub enum Admission {
    /// A route matched; the body (if any) goes into this context
    Matched(RequestContext),
    /// Answered without a handler (fallback or 404)
    Respond(HttpResponse),
}

/// What survives from the request once the handler has its arguments
#[derive(Debug)]
struct Invocation {
    request: Arc<HttpRequest>,
    route: Arc<Route>,
    media_type: MediaType,
    response: ResponseHandle,
    session: Option<SessionHandle>,
}

/// Arguments resolved and ready for the handler
#[derive(Debug)]
pub struct PreparedCall {
    invocation: Invocation,
    args: Args,
    receiver: oneshot::Receiver<Reply>,
}

impl PreparedCall {
    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.invocation.route
    }
}

/// The handler has run
#[derive(Debug)]
pub struct CallOutcome {
    invocation: Invocation,
    result: Result<Reply, DispatchError>,
    receiver: oneshot::Receiver<Reply>,
}

impl CallOutcome {
    pub fn is_err(&self) -> bool {
        self.result.is_err()
    }
}

/// A handler answered [`Reply::Deferred`] and will push its reply later
#[derive(Debug)]
pub struct DeferredReply {
    invocation: Invocation,
    receiver: oneshot::Receiver<Reply>,
}

#[derive(Debug)]
pub enum Dispatched {
    Ready(HttpResponse),
    Deferred(DeferredReply),
}

/// Shared request dispatcher; one per server
pub struct Dispatcher {
    registry: Arc<RouteRegistry>,
    transformers: TransformerChain,
    error_transformers: TransformerChain,
    fallback: Option<Arc<dyn Fallback>>,
    sessions: Arc<dyn SessionStore>,
    sessions_config: SessionsConfig,
    files: Arc<FilesConfig>,
    log_requests: bool,
    access_log: Arc<dyn AccessLog>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    pub fn files_config(&self) -> Arc<FilesConfig> {
        Arc::clone(&self.files)
    }

    /// Match the request head against the route table.
    ///
    /// On a miss the fallback is consulted once; if it declines the request
    /// is answered with 404.
    pub fn admit(&self, request: Arc<HttpRequest>) -> Admission {
        let descriptor = RequestDescriptor::from_request(&request);
        if let Some(found) = self.registry.find(request.path(), &descriptor) {
            log::debug!(
                "{} {} matched {}",
                request.method(),
                request.path(),
                found.route.template()
            );
            return Admission::Matched(RequestContext::matched(request, found));
        }

        if let Some(fallback) = &self.fallback {
            if let Some(response) = fallback.handle(request.path(), &request) {
                log::debug!("{} {} served by fallback", request.method(), request.path());
                return Admission::Respond(response);
            }
        }

        let err = DispatchError::NotFound(request.path().to_string());
        Admission::Respond(self.error_response(&err, &request, None))
    }

    /// Load the session if the route asks for one and resolve the arguments.
    /// Consumes the context; uploads live on only through the arguments.
    pub fn prepare(&self, mut ctx: RequestContext) -> Result<PreparedCall, DispatchError> {
        let route = ctx.route().cloned().ok_or_else(|| {
            DispatchError::Internal(anyhow::anyhow!("No route bound to request for {}", ctx.path()))
        })?;

        if route.needs_session() && self.sessions_config.enabled {
            let id = ctx
                .request()
                .cookie(&self.sessions_config.cookie_name)
                .map(|cookie| cookie.value().to_string());
            let session = self.sessions.load(id.as_deref());
            ctx.set_session(session);
        }

        let (pusher, receiver) = ResponsePusher::channel();
        let response = ResponseHandle::new();
        let (args, _) = {
            // the scope's pusher must not outlive resolution, only handler-held clones keep it open
            let scope = InvocationScope { response: response.clone(), pusher };
            params::resolve(route.params(), &ctx, &scope)
        };

        Ok(PreparedCall {
            invocation: Invocation {
                request: Arc::clone(ctx.request()),
                media_type: ctx.media_type().clone(),
                session: ctx.session().cloned(),
                route,
                response,
            },
            args,
            receiver,
        })
    }

    /// Call the handler. Errors and panics are caught here and nowhere else.
    pub fn call(&self, prepared: PreparedCall) -> CallOutcome {
        let PreparedCall { invocation, args, receiver } = prepared;
        let handler = Arc::clone(invocation.route.handler());
        let template = invocation.route.template();

        let invoked = panic::catch_unwind(AssertUnwindSafe(|| Handler::call(handler.as_ref(), args)));
        let result = match invoked {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(err)) => match err.downcast::<WebFailure>() {
                Ok(failure) => {
                    log::debug!("Handler for {} returned {}", template, failure);
                    Err(DispatchError::Failure(failure))
                }
                Err(err) => {
                    log::error!("Handler for {} failed: {:#}", template, err);
                    Err(DispatchError::Internal(err))
                }
            },
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                log::error!("Handler for {} panicked: {}", template, message);
                Err(DispatchError::Internal(anyhow::anyhow!("handler panicked: {}", message)))
            }
        };

        CallOutcome { invocation, result, receiver }
    }

    /// Turn the handler's reply into a response
    pub fn render(&self, outcome: CallOutcome) -> Dispatched {
        let CallOutcome { invocation, result, receiver } = outcome;
        match result {
            Ok(Reply::Deferred) => Dispatched::Deferred(DeferredReply { invocation, receiver }),
            Ok(reply) => Dispatched::Ready(self.complete(&invocation, reply)),
            Err(err) => Dispatched::Ready(self.complete_error(&invocation, &err)),
        }
    }

    /// Prepare, call and render in one go
    pub fn invoke(&self, ctx: RequestContext) -> Dispatched {
        let request = Arc::clone(ctx.request());
        let media_type = ctx.media_type().clone();
        match self.prepare(ctx) {
            Ok(prepared) => self.render(self.call(prepared)),
            Err(err) => Dispatched::Ready(self.error_response(&err, &request, Some(&media_type))),
        }
    }

    /// Wait for a deferred reply. A pusher dropped without pushing is an
    /// internal error.
    pub async fn resolve_deferred(&self, deferred: DeferredReply) -> HttpResponse {
        let DeferredReply { invocation, receiver } = deferred;
        match receiver.await {
            Ok(Reply::Deferred) => {
                let err = DispatchError::Internal(anyhow::anyhow!("deferred reply pushed as a reply"));
                self.complete_error(&invocation, &err)
            }
            Ok(reply) => self.complete(&invocation, reply),
            Err(_) => {
                log::error!(
                    "Response pusher for {} dropped without a reply",
                    invocation.route.template()
                );
                let err = DispatchError::Internal(anyhow::anyhow!("response pusher dropped"));
                self.complete_error(&invocation, &err)
            }
        }
    }

    fn complete(&self, invocation: &Invocation, reply: Reply) -> HttpResponse {
        let payload = match reply {
            Reply::Response(mut response) => {
                invocation.response.apply_to(&mut response, false);
                self.attach_session(invocation, &mut response);
                return response;
            }
            Reply::Failure(failure) => {
                log::debug!("Handler for {} returned {}", invocation.route.template(), failure);
                return self.complete_error(invocation, &DispatchError::Failure(failure));
            }
            Reply::Deferred => {
                let err = DispatchError::Internal(anyhow::anyhow!("reply deferred twice"));
                return self.complete_error(invocation, &err);
            }
            Reply::Value(payload) => payload,
        };

        let mut response = match invocation.response.redirect_response() {
            Some(redirect) => redirect,
            None => {
                let cx = TransformContext {
                    request: &invocation.request,
                    media_type: &invocation.media_type,
                    route: Some(&invocation.route),
                };
                match self.transformers.render(payload, &cx) {
                    Ok(mut response) => {
                        invocation.response.apply_to(&mut response, true);
                        response
                    }
                    Err(TransformError::NotAcceptable) => {
                        log::debug!(
                            "No transformer renders the reply of {} as {}",
                            invocation.route.template(),
                            invocation.media_type
                        );
                        return self.complete_error(invocation, &DispatchError::NotAcceptable);
                    }
                    Err(err) => {
                        log::error!("Rendering reply of {} failed: {}", invocation.route.template(), err);
                        return self.complete_error(invocation, &DispatchError::Internal(err.into()));
                    }
                }
            }
        };
        invocation.response.apply_to(&mut response, false);
        self.attach_session(invocation, &mut response);
        response
    }

    fn complete_error(&self, invocation: &Invocation, err: &DispatchError) -> HttpResponse {
        let mut response =
            self.error_response(err, &invocation.request, Some(&invocation.media_type));
        invocation.response.apply_to(&mut response, false);
        self.attach_session(invocation, &mut response);
        response
    }

    fn attach_session(&self, invocation: &Invocation, response: &mut HttpResponse) {
        if let Some(session) = invocation.session.as_ref().filter(|s| s.is_new()) {
            let cookie = HttpCookie::new(self.sessions_config.cookie_name.as_str(), session.id())
                .with_path(self.sessions_config.cookie_path.as_str())
                .http_only(true);
            response.add_cookie(cookie);
        }
    }

    /// Render an error through the error transformers. Falls back to a bare
    /// 500 if that fails; this path cannot fail itself.
    pub fn error_response(
        &self,
        err: &DispatchError,
        request: &HttpRequest,
        media_type: Option<&MediaType>,
    ) -> HttpResponse {
        let negotiated;
        let media_type = match media_type {
            Some(media_type) => media_type,
            None => {
                negotiated = MediaType::negotiate(&request.accept(), &[]).unwrap_or_else(MediaType::any);
                &negotiated
            }
        };

        let cx = TransformContext { request, media_type, route: None };
        match self.error_transformers.render(Payload::Failure(err.to_failure()), &cx) {
            Ok(response) => response,
            Err(render_err) => {
                log::error!("Rendering {} failed: {}", err.status(), render_err);
                HttpResponse::internal_server_error()
            }
        }
    }

    /// Set the framing headers. Returns true if the connection must close
    /// after this response.
    pub fn finalize(&self, response: &mut HttpResponse, request: &HttpRequest, keep_alive: bool) -> bool {
        let close = !keep_alive || request.wants_close();
        if close {
            response.set_header(headers::CONNECTION, "close");
        }
        if !matches!(response.status(), StatusCode::NoContent | StatusCode::NotModified) {
            let length = response.body_bytes().len().to_string();
            response.set_header(headers::CONTENT_LENGTH, &length);
        }
        close
    }

    /// Hand the written exchange to the access log
    pub fn record_access(&self, request: &HttpRequest, response: &HttpResponse) {
        if self.log_requests {
            self.access_log.record(&AccessEntry::new(request, response));
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.registry.len())
            .field("transformers", &self.transformers)
            .field("error_transformers", &self.error_transformers)
            .field("fallback", &self.fallback.is_some())
            .field("sessions", &self.sessions_config)
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Builder for [`Dispatcher`]
pub struct DispatcherBuilder {
    registry: RouteRegistry,
    transformers: TransformerChain,
    error_transformers: TransformerChain,
    fallback: Option<Arc<dyn Fallback>>,
    sessions: Option<Arc<dyn SessionStore>>,
    sessions_config: SessionsConfig,
    files: FilesConfig,
    log_requests: bool,
    access_log: Option<Arc<dyn AccessLog>>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            registry: RouteRegistry::new(),
            transformers: TransformerChain::with_defaults(),
            error_transformers: TransformerChain::error_defaults(),
            fallback: None,
            sessions: None,
            sessions_config: SessionsConfig::default(),
            files: FilesConfig::default(),
            log_requests: true,
            access_log: None,
        }
    }

    /// Take files, sessions and request logging settings from the config
    pub fn with_config(mut self, config: &CourierConfig) -> Self {
        self.files = config.files.clone();
        self.sessions_config = config.sessions.clone();
        self.log_requests = config.server.log_requests;
        self
    }

    pub fn with_registry(mut self, registry: RouteRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_route(mut self, route: RouteBuilder) -> Result<Self, RouteError> {
        self.registry.route(route)?;
        Ok(self)
    }

    pub fn with_scope(mut self, scope: Scope) -> Result<Self, RouteError> {
        self.registry.register_scope(scope)?;
        Ok(self)
    }

    /// Replace the success chain entirely
    pub fn with_transformers(mut self, chain: TransformerChain) -> Self {
        self.transformers = chain;
        self
    }

    pub fn with_transformer<T: Transformer + 'static>(mut self, transformer: T) -> Self {
        self.transformers.register(transformer);
        self
    }

    pub fn with_error_transformers(mut self, chain: TransformerChain) -> Self {
        self.error_transformers = chain;
        self
    }

    pub fn with_error_transformer<T: Transformer + 'static>(mut self, transformer: T) -> Self {
        self.error_transformers.register(transformer);
        self
    }

    pub fn with_fallback<F: Fallback + 'static>(mut self, fallback: F) -> Self {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    pub fn with_session_store<S: SessionStore + 'static>(mut self, store: S) -> Self {
        self.sessions = Some(Arc::new(store));
        self
    }

    pub fn with_files_config(mut self, files: FilesConfig) -> Self {
        self.files = files;
        self
    }

    pub fn with_access_log<A: AccessLog + 'static>(mut self, access_log: A) -> Self {
        self.access_log = Some(Arc::new(access_log));
        self
    }

    pub fn build(self) -> Dispatcher {
        log::info!(
            "Dispatcher ready: {} routes, transformers {:?}",
            self.registry.len(),
            self.transformers.names()
        );
        Dispatcher {
            registry: self.registry.freeze(),
            transformers: self.transformers,
            error_transformers: self.error_transformers,
            fallback: self.fallback,
            sessions: self.sessions.unwrap_or_else(|| Arc::new(MemorySessionStore::new())),
            sessions_config: self.sessions_config,
            files: Arc::new(self.files),
            log_requests: self.log_requests,
            access_log: self.access_log.unwrap_or_else(|| Arc::new(LogAccessLog)),
        }
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParameterSpec, WholeObject};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn request(head: &str) -> Arc<HttpRequest> {
        Arc::new(HttpRequest::parse_head(head.as_bytes()).unwrap())
    }

    fn dispatch(dispatcher: &Dispatcher, head: &str) -> HttpResponse {
        match dispatcher.admit(request(head)) {
            Admission::Matched(ctx) => match dispatcher.invoke(ctx) {
                Dispatched::Ready(response) => response,
                Dispatched::Deferred(_) => panic!("unexpected deferred reply"),
            },
            Admission::Respond(response) => response,
        }
    }

    #[test]
    fn test_full_response_bypasses_chain() {
        let dispatcher = Dispatcher::builder()
            .with_transformers(TransformerChain::new())
            .with_route(Route::builder("/raw").handler(|_| {
                Ok(Reply::response(HttpResponse::new(StatusCode::Accepted).text("raw")))
            }))
            .unwrap()
            .build();

        let response = dispatch(&dispatcher, "GET /raw HTTP/1.1\r\n\r\n");
        assert_eq!(response.status(), StatusCode::Accepted);
        assert_eq!(response.body_string().unwrap(), "raw");
    }

    #[test]
    fn test_no_transformer_is_not_acceptable() {
        let dispatcher = Dispatcher::builder()
            .with_route(Route::builder("/hello").handler(|_| Ok(Reply::text("hello"))))
            .unwrap()
            .build();

        let response = dispatch(&dispatcher, "GET /hello HTTP/1.1\r\nAccept: image/png\r\n\r\n");
        assert_eq!(response.status(), StatusCode::NotAcceptable);

        let response = dispatch(&dispatcher, "GET /hello HTTP/1.1\r\n\r\n");
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.body_string().unwrap(), "hello");
    }

    #[test]
    fn test_unpinned_route_negotiates_per_payload() {
        let dispatcher = Dispatcher::builder()
            .with_route(Route::builder("/report").handler(|_| Ok(Reply::json(serde_json::json!({ "ok": true })))))
            .unwrap()
            .build();

        let browser = "GET /report HTTP/1.1\r\nAccept: text/html,application/xhtml+xml,*/*;q=0.8\r\n\r\n";
        let response = dispatch(&dispatcher, browser);
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.header_value("content-type"), Some("application/json"));
        assert_eq!(response.body_string().unwrap(), r#"{"ok":true}"#);

        let refused = "GET /report HTTP/1.1\r\nAccept: application/json;q=0\r\n\r\n";
        let response = dispatch(&dispatcher, refused);
        assert_eq!(response.status(), StatusCode::NotAcceptable);
        assert_eq!(response.header_value("content-type"), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn test_handler_invoked_once_with_args() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let dispatcher = Dispatcher::builder()
            .with_route(
                Route::builder("/items/{id:[0-9]+}")
                    .param(ParameterSpec::path("id").of(crate::params::ValueType::U64))
                    .produces("application/json")
                    .handler(move |args: Args| {
                        seen.fetch_add(1, Ordering::SeqCst);
                        Ok(Reply::json(serde_json::json!({ "id": args[0].as_u64() })))
                    }),
            )
            .unwrap()
            .build();

        let response = dispatch(&dispatcher, "GET /items/42 HTTP/1.1\r\n\r\n");
        assert_eq!(response.body_string().unwrap(), r#"{"id":42}"#);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_not_found_and_fallback() {
        let dispatcher = Dispatcher::builder().build();
        let response = dispatch(&dispatcher, "GET /nothing HTTP/1.1\r\nAccept: application/json\r\n\r\n");
        assert_eq!(response.status(), StatusCode::NotFound);
        let body: serde_json::Value = serde_json::from_slice(response.body_bytes()).unwrap();
        assert_eq!(body["error"], "not_found");

        let asked = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&asked);
        let dispatcher = Dispatcher::builder()
            .with_fallback(move |path: &str, _: &HttpRequest| {
                counter.fetch_add(1, Ordering::SeqCst);
                path.starts_with("/static/").then(|| HttpResponse::ok().text("asset"))
            })
            .build();
        let response = dispatch(&dispatcher, "GET /static/app.css HTTP/1.1\r\n\r\n");
        assert_eq!(response.body_string().unwrap(), "asset");
        let response = dispatch(&dispatcher, "GET /other HTTP/1.1\r\n\r\n");
        assert_eq!(response.status(), StatusCode::NotFound);
        assert_eq!(asked.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_handler_errors() {
        let dispatcher = Dispatcher::builder()
            .with_route(Route::builder("/boom").handler(|_| Err(anyhow::anyhow!("secret cause"))))
            .unwrap()
            .with_route(
                Route::builder("/missing")
                    .handler(|_| Err(WebFailure::not_found("no such widget").into())),
            )
            .unwrap()
            .with_route(Route::builder("/refused").handler(|_| {
                Ok(Reply::failure(StatusCode::Forbidden, "not yours"))
            }))
            .unwrap()
            .with_route(Route::builder("/panic").handler(|_| panic!("handler bug")))
            .unwrap()
            .build();

        let response = dispatch(&dispatcher, "GET /boom HTTP/1.1\r\n\r\n");
        assert_eq!(response.status(), StatusCode::InternalServerError);
        assert!(!response.body_string().unwrap().contains("secret"));

        let response = dispatch(&dispatcher, "GET /missing HTTP/1.1\r\n\r\n");
        assert_eq!(response.status(), StatusCode::NotFound);
        assert!(response.body_string().unwrap().contains("no such widget"));

        let response = dispatch(&dispatcher, "GET /refused HTTP/1.1\r\n\r\n");
        assert_eq!(response.status(), StatusCode::Forbidden);

        let response = dispatch(&dispatcher, "GET /panic HTTP/1.1\r\n\r\n");
        assert_eq!(response.status(), StatusCode::InternalServerError);
    }

    #[test]
    fn test_broken_error_chain_falls_back_to_bare_500() {
        let dispatcher = Dispatcher::builder()
            .with_error_transformers(TransformerChain::new())
            .build();
        let response = dispatch(&dispatcher, "GET /nothing HTTP/1.1\r\n\r\n");
        assert_eq!(response.status(), StatusCode::InternalServerError);
        assert!(response.body_bytes().is_empty());
    }

    #[test]
    fn test_staged_response_and_redirect() {
        let dispatcher = Dispatcher::builder()
            .with_route(
                Route::builder("/create")
                    .param(ParameterSpec::whole(WholeObject::Response))
                    .handler(|args: Args| {
                        let response = args[0].as_response().unwrap();
                        response.set_status(StatusCode::Created);
                        response.set_header("X-Item", "7");
                        Ok(Reply::text("created"))
                    }),
            )
            .unwrap()
            .with_route(
                Route::builder("/old")
                    .param(ParameterSpec::whole(WholeObject::Response))
                    .handler(|args: Args| {
                        args[0].as_response().unwrap().redirect("/new");
                        Ok(Reply::empty())
                    }),
            )
            .unwrap()
            .build();

        let response = dispatch(&dispatcher, "GET /create HTTP/1.1\r\n\r\n");
        assert_eq!(response.status(), StatusCode::Created);
        assert_eq!(response.header_value("x-item"), Some("7"));

        let response = dispatch(&dispatcher, "GET /old HTTP/1.1\r\n\r\n");
        assert_eq!(response.status(), StatusCode::SeeOther);
        assert_eq!(response.header_value("location"), Some("/new"));
    }

    #[test]
    fn test_session_loaded_only_when_needed() {
        let store = MemorySessionStore::new();
        let dispatcher = Dispatcher::builder()
            .with_session_store(store.clone())
            .with_route(
                Route::builder("/visits")
                    .param(ParameterSpec::whole(WholeObject::Session))
                    .handler(|args: Args| {
                        let session = args[0].as_session().unwrap();
                        let visits = session.get_as::<u32>("visits").unwrap_or(0) + 1;
                        session.put("visits", &visits)?;
                        Ok(Reply::text(visits.to_string()))
                    }),
            )
            .unwrap()
            .with_route(Route::builder("/plain").handler(|_| Ok(Reply::empty())))
            .unwrap()
            .build();

        let response = dispatch(&dispatcher, "GET /plain HTTP/1.1\r\n\r\n");
        assert!(response.cookies().is_empty());
        assert_eq!(store.session_count(), 0);

        let response = dispatch(&dispatcher, "GET /visits HTTP/1.1\r\n\r\n");
        assert_eq!(response.body_string().unwrap(), "1");
        let cookie = response.cookies()[0].clone();
        assert_eq!(cookie.name(), "courier-session");

        let head = format!("GET /visits HTTP/1.1\r\nCookie: courier-session={}\r\n\r\n", cookie.value());
        let response = dispatch(&dispatcher, &head);
        assert_eq!(response.body_string().unwrap(), "2");
        assert!(response.cookies().is_empty());
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn test_deferred_reply() {
        let dispatcher = Dispatcher::builder()
            .with_route(
                Route::builder("/later")
                    .param(ParameterSpec::whole(WholeObject::Pusher))
                    .handler(|args: Args| {
                        let pusher = args[0].as_pusher().unwrap().clone();
                        std::thread::spawn(move || pusher.push(Reply::text("pushed")));
                        Ok(Reply::deferred())
                    }),
            )
            .unwrap()
            .with_route(Route::builder("/forgotten").handler(|_| Ok(Reply::deferred())))
            .unwrap()
            .build();

        for (path, status) in [("/later", StatusCode::Ok), ("/forgotten", StatusCode::InternalServerError)] {
            let Admission::Matched(ctx) = dispatcher.admit(request(&format!("GET {} HTTP/1.1\r\n\r\n", path)))
            else {
                panic!("route should match");
            };
            let Dispatched::Deferred(deferred) = dispatcher.invoke(ctx) else {
                panic!("reply should be deferred");
            };
            let response = dispatcher.resolve_deferred(deferred).await;
            assert_eq!(response.status(), status);
        }
    }

    #[test]
    fn test_finalize_and_access_log() {
        struct Recording(Arc<Mutex<Vec<String>>>);
        impl AccessLog for Recording {
            fn record(&self, entry: &AccessEntry) {
                self.0.lock().unwrap().push(entry.common_log_line());
            }
        }

        let lines = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::builder().with_access_log(Recording(Arc::clone(&lines))).build();

        let http10 = request("GET / HTTP/1.0\r\n\r\n");
        let mut response = HttpResponse::ok().text("bye");
        assert!(dispatcher.finalize(&mut response, &http10, true));
        assert_eq!(response.header_value("connection"), Some("close"));
        assert_eq!(response.header_value("content-length"), Some("3"));

        let mut empty = HttpResponse::new(StatusCode::NoContent);
        assert!(dispatcher.finalize(&mut empty, &http10, true));
        assert_eq!(empty.header_value("content-length"), None);

        let http11 = request("GET / HTTP/1.1\r\n\r\n");
        let mut response = HttpResponse::ok().text("hi");
        assert!(!dispatcher.finalize(&mut response, &http11, true));
        assert_eq!(response.header_value("content-length"), Some("2"));
        assert!(dispatcher.finalize(&mut response, &http11, false));

        dispatcher.record_access(&http11, &response);
        assert_eq!(lines.lock().unwrap().len(), 1);
        assert!(lines.lock().unwrap()[0].contains("\"GET / HTTP/1.1\" 200 2"));
    }
}
