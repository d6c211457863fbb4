//! TCP listener and event loop hosting the HTTP connections.

pub mod listener;

pub use listener::{ServerHandle, serve, start};
