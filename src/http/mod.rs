//! HTTP protocol implementation.
//!
//! This module implements a minimal HTTP/1.1 endpoint that serves exactly
//! one request per connection.
//!
//! # Architecture
//!
//! - **`parser`**: incremental decoder turning raw bytes into request events
//! - **`guard`**: body size limit and `Expect` negotiation
//! - **`params`**: query string and form body decoding
//! - **`connection`**: the per-connection state machine
//! - **`request`** / **`response`** / **`headers`**: message types
//! - **`writer`**: serializes responses onto the socket
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌──────────────────┐
//!        │ AwaitingMessage  │ ← Wait for the request line
//!        └──────┬───────────┘
//!               │ MessageBegin
//!               ▼
//!        ┌──────────────────┐
//!        │  ReceivingBody   │ ← Headers, 100/413/417, body chunks
//!        └──────┬───────────┘
//!               │ MessageComplete
//!               ▼
//!        ┌──────────────────┐
//!        │    Complete      │ ← Materialize params, call the handler
//!        └──────┬───────────┘
//!               │ Final response queued
//!               ▼
//!        ┌──────────────────┐
//!        │     Closing      │ ← Flush, then shut the socket down
//!        └──────┬───────────┘
//!               ▼
//!             Closed
//! ```
//!
//! A rejection (413 or 417) jumps straight to `Closing` from wherever the
//! connection is; the rest of the request is never read.

pub mod connection;
pub mod guard;
pub mod headers;
pub mod params;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
