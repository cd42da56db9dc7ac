//! Courier - Core
//!
//! Request dispatch for HTTP servers: path templates with regex captures,
//! streaming body assembly, typed parameter injection and negotiated
//! response rendering.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use courier_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CourierConfig::load()?;
//!     init_logging(&config.logging);
//!
//!     let dispatcher = Dispatcher::builder()
//!         .with_config(&config)
//!         .with_route(
//!             Route::builder("/hello/{name}")
//!                 .get()
//!                 .param(ParameterSpec::path("name"))
//!                 .handler(|args: Args| Ok(Reply::text(format!("Hello {}", args[0].as_str().unwrap_or("?"))))),
//!         )?
//!         .build();
//!
//!     CourierServer::new(&config, dispatcher).serve().await
//! }
//! ```
//!
//! # Architecture
//!
//! - [`routing`] - Path templates, routes and the priority-ordered registry
//! - [`body`] - Incremental url-encoded and multipart decoding
//! - [`params`] - Parameter declarations and resolution into handler arguments
//! - [`transform`] - Success and error transformer chains
//! - [`dispatch`] - The dispatcher: match, invoke exactly once, render
//! - [`connection`] - Per-connection event-driven state machine
//! - [`server`] - hyper HTTP/1 server feeding connections
//! - [`session`] - Session handles and the in-memory store
//! - [`config`] - TOML + environment configuration

pub mod body;
pub mod config; // Configuration system with TOML support
pub mod connection;
pub mod context;
pub mod dispatch;
pub mod http;
pub mod logging; // env_logger setup and access log collaborator
pub mod params;
pub mod routing;
pub mod server;
pub mod session;
pub mod transform;

// Prelude module for convenient imports
pub mod prelude;

// Re-exports of main types and traits
pub use dispatch::{Dispatcher, Handler, Reply, WebFailure};
pub use routing::{Route, RouteRegistry};
pub use server::CourierServer;

// Main result type for the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Courier
#[derive(Debug)]
pub enum Error {
    /// HTTP-related errors (parsing, server issues, etc.)
    HttpError(String),
    /// Route declaration errors
    RouteError(String),
    /// Request body decoding errors
    BodyError(String),
    /// Configuration errors
    ConfigError(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::HttpError(msg) => write!(f, "HTTP Error: {}", msg),
            Error::RouteError(msg) => write!(f, "Route Error: {}", msg),
            Error::BodyError(msg) => write!(f, "Body Error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<routing::RouteError> for Error {
    fn from(err: routing::RouteError) -> Self {
        Error::RouteError(err.to_string())
    }
}

impl From<body::AssemblyError> for Error {
    fn from(err: body::AssemblyError) -> Self {
        Error::BodyError(err.to_string())
    }
}
