//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use courier_core::prelude::*;
//! ```

// === Configuration and logging ===
pub use crate::config::CourierConfig;
pub use crate::logging::{init_logging, AccessLog, LogAccessLog};

// === Routing ===
pub use crate::routing::{Fallback, Route, RouteRegistry, Scope};

// === Parameters ===
pub use crate::params::{Arg, Args, ParameterSpec, Required, ValidationResult, ValueType, WholeObject};

// === Dispatch ===
pub use crate::dispatch::{
    Dispatcher, Handler, HandlerResult, Reply, ResponseHandle, ResponsePusher, WebFailure,
};
pub use crate::server::CourierServer;

// === Rendering ===
pub use crate::transform::{Payload, TransformContext, TransformError, Transformer};

// === HTTP types ===
pub use crate::http::{HttpCookie, HttpMethod, HttpRequest, HttpResponse, MediaType, StatusCode};

// === Sessions ===
pub use crate::session::{MemorySessionStore, SessionHandle, SessionStore};
