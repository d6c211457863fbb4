//! Intake - HTTP event input
//!
//! A one-request-per-connection HTTP/1.1 endpoint that decodes query and
//! form parameters and hands them to an application [`Handler`].

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod intake;
pub mod server;

pub use handler::Handler;
