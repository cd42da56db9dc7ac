//! Route declaration and lookup
//!
//! Routes are declared up front with [`Route::builder`], grouped under
//! [`Scope`] prefixes if needed, and registered into a [`RouteRegistry`].
//! The registry is frozen into an `Arc` before serving and never changes
//! afterwards.
//!
//! ```rust,ignore
//! let mut registry = RouteRegistry::new();
//! registry.register(
//!     Route::builder("/users/{id:[0-9]+}")
//!         .get()
//!         .produces("application/json")
//!         .param(ParameterSpec::path("id").of(ValueType::U64))
//!         .handler(|args: Args| Ok(Reply::json(serde_json::json!({ "id": args[0].as_u64() }))))
//!         .build()?,
//! );
//! let registry = registry.freeze();
//! ```

pub mod registry;
pub mod route;
pub mod template;

pub use registry::{Fallback, RouteRegistry, Scope};
pub use route::{RequestDescriptor, Route, RouteBuilder, RouteMatch};
pub use template::{join_paths, normalize_path, CompiledPattern, PathParams, Segment};

/// Errors raised while declaring routes
#[derive(thiserror::Error, Debug)]
pub enum RouteError {
    #[error("Invalid route template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("Invalid media type '{0}'")]
    InvalidMediaType(String),

    #[error("Route '{0}' has no handler")]
    MissingHandler(String),
}
