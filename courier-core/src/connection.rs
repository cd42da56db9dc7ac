//! Per-connection dispatch state machine
//!
//! A [`Connection`] is driven by protocol events: a parsed request head,
//! body chunks and the end-of-body marker. Every event returns a
//! [`Progress`] telling the server what to do next. The handler is invoked
//! at most once per request, however often the terminal event fires.
//!
//! ```text
//! MatchPending -> Matched -> BodyPending -> Resolving -> Invoking -> Transforming -> Written
//!       \            \            \             \            \             \
//!        `------------`------------`-------------`------------`-------------`--> Errored
//! ```

use std::sync::Arc;

use crate::body::{AssemblyPhase, BodyAssembler};
use crate::context::RequestContext;
use crate::dispatch::{Admission, DispatchError, Dispatched, Dispatcher};
use crate::http::{HttpRequest, HttpResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    MatchPending,
    Matched,
    BodyPending,
    Resolving,
    Invoking,
    Transforming,
    Written,
    Errored,
}

/// What the server should do after an event
#[derive(Debug)]
pub enum Progress {
    /// Keep feeding events
    Pending,
    /// Run the handler for this context (off the I/O path)
    Invoke(RequestContext),
    /// Write this response; no handler runs for the request
    Respond(HttpResponse),
}

pub struct Connection {
    dispatcher: Arc<Dispatcher>,
    assembler: BodyAssembler,
    state: DispatchState,
    context: Option<RequestContext>,
    request: Option<Arc<HttpRequest>>,
    /// A handler call or a response has been issued for the current request
    dispatched: bool,
}

impl Connection {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        let assembler = BodyAssembler::new(dispatcher.files_config());
        Self {
            dispatcher,
            assembler,
            state: DispatchState::Written,
            context: None,
            request: None,
            dispatched: false,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn request(&self) -> Option<&Arc<HttpRequest>> {
        self.request.as_ref()
    }

    /// A request head arrived
    pub fn on_request(&mut self, request: HttpRequest) -> Progress {
        self.discard();
        let request = Arc::new(request);
        self.request = Some(Arc::clone(&request));
        self.state = DispatchState::MatchPending;

        match self.dispatcher.admit(Arc::clone(&request)) {
            Admission::Respond(response) => {
                self.state = if response.status().is_error() {
                    DispatchState::Errored
                } else {
                    DispatchState::Transforming
                };
                self.dispatched = true;
                Progress::Respond(response)
            }
            Admission::Matched(ctx) => {
                self.state = DispatchState::Matched;
                if request.method().permits_body() {
                    self.assembler.begin(&request);
                    self.context = Some(ctx);
                    self.state = DispatchState::BodyPending;
                    Progress::Pending
                } else {
                    self.state = DispatchState::Resolving;
                    self.dispatched = true;
                    Progress::Invoke(ctx)
                }
            }
        }
    }

    /// A body chunk arrived
    pub fn on_chunk(&mut self, chunk: &[u8]) -> Progress {
        if self.dispatched || self.state != DispatchState::BodyPending {
            return Progress::Pending;
        }
        let Some(ctx) = self.context.as_mut() else {
            return Progress::Pending;
        };
        match self.assembler.offer(chunk, ctx) {
            Ok(()) => Progress::Pending,
            Err(err) => self.fail(err.into()),
        }
    }

    /// The body ended. Only the first terminal event for a request can
    /// yield [`Progress::Invoke`].
    pub fn on_last(&mut self) -> Progress {
        if self.dispatched || self.state != DispatchState::BodyPending {
            log::trace!("Redundant end of body ignored");
            return Progress::Pending;
        }
        let Some(mut ctx) = self.context.take() else {
            return Progress::Pending;
        };
        match self.assembler.finish(&mut ctx) {
            Ok(_) => {
                self.state = DispatchState::Resolving;
                self.dispatched = true;
                Progress::Invoke(ctx)
            }
            Err(err) => {
                self.context = Some(ctx);
                self.fail(err.into())
            }
        }
    }

    /// Resolve arguments, call the handler and render. Blocking: the server
    /// runs this on the blocking pool.
    pub fn invoke(&mut self, ctx: RequestContext) -> Dispatched {
        self.state = DispatchState::Resolving;
        let request = Arc::clone(ctx.request());
        let media_type = ctx.media_type().clone();
        let prepared = match self.dispatcher.prepare(ctx) {
            Ok(prepared) => prepared,
            Err(err) => {
                self.state = DispatchState::Errored;
                let response = self.dispatcher.error_response(&err, &request, Some(&media_type));
                return Dispatched::Ready(response);
            }
        };

        self.state = DispatchState::Invoking;
        let outcome = self.dispatcher.call(prepared);
        self.state = if outcome.is_err() {
            DispatchState::Errored
        } else {
            DispatchState::Transforming
        };
        self.dispatcher.render(outcome)
    }

    /// The response for the current request has been handed to the wire
    pub fn on_written(&mut self) {
        if self.state != DispatchState::Errored {
            self.state = DispatchState::Written;
        }
        self.discard();
    }

    /// The peer went away. Partial bodies are dropped without invoking
    /// the handler.
    pub fn abort(&mut self) {
        if self.state == DispatchState::BodyPending && !self.dispatched {
            log::debug!(
                "Connection closed with {} body bytes pending; request discarded",
                self.assembler.received()
            );
        }
        self.discard();
        self.state = DispatchState::Errored;
    }

    fn fail(&mut self, err: DispatchError) -> Progress {
        log::debug!("Request body rejected: {}", err);
        let response = match (&self.request, &self.context) {
            (Some(request), ctx) => self.dispatcher.error_response(
                &err,
                request,
                ctx.as_ref().map(|ctx| ctx.media_type()),
            ),
            (None, _) => HttpResponse::internal_server_error(),
        };
        self.context = None;
        self.assembler.reset();
        self.state = DispatchState::Errored;
        self.dispatched = true;
        Progress::Respond(response)
    }

    fn discard(&mut self) {
        if self.assembler.phase() != AssemblyPhase::NoBody {
            self.assembler.reset();
        }
        self.context = None;
        self.dispatched = false;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("phase", &self.assembler.phase())
            .field("dispatched", &self.dispatched)
            .finish()
    }
}
