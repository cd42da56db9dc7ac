//! Sessions
//!
//! The dispatcher only needs a key-value handle per request; where sessions
//! live is up to the [`SessionStore`] implementation. Stores are consulted
//! only for routes that declare a session parameter.
//!
//! # Example
//!
//! ```no_run
//! use courier_core::session::{MemorySessionStore, SessionStore};
//!
//! let store = MemorySessionStore::new();
//! let session = store.load(None);
//! session.put("user", &"alice")?;
//! assert!(session.is_new());
//! # Ok::<(), anyhow::Error>(())
//! ```

mod memory;
mod store;

pub use memory::MemorySessionStore;
pub use store::{Session, SessionData, SessionHandle, SessionStore};
