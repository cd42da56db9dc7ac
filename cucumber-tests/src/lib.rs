//! BDD scenarios for Courier request dispatch.
//!
//! The world drives [`courier_core::connection::Connection`] with protocol
//! events directly, so scenarios cover routing, body assembly and rendering
//! without opening sockets.

pub mod features;
