//! Request body size enforcement.

/// Outcome of offering a body chunk to the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The chunk fits; it has been counted.
    Accept,
    /// The chunk would push the body past the limit; nothing was counted.
    Reject,
}

/// How to answer the `Expect` header of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// No `Expect` header, nothing to send.
    None,
    /// Send an interim `100 Continue`.
    Continue,
    /// The declared body is over the limit.
    TooLarge,
    /// An expectation this server cannot meet.
    Unsupported(String),
}

/// Tracks the cumulative body size of one request against the configured limit.
#[derive(Debug, Clone)]
pub struct BodyGuard {
    limit: usize,
    received: usize,
}

impl BodyGuard {
    pub fn new(limit: usize) -> Self {
        Self { limit, received: 0 }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn received(&self) -> usize {
        self.received
    }

    /// Starts counting a new message.
    pub fn reset(&mut self) {
        self.received = 0;
    }

    pub fn admit(&mut self, chunk_len: usize) -> Admission {
        match self.received.checked_add(chunk_len) {
            Some(total) if total <= self.limit => {
                self.received = total;
                Admission::Accept
            }
            _ => Admission::Reject,
        }
    }

    /// Decides the interim answer for `Expect`, given the declared body length.
    pub fn expectation(&self, expect: Option<&str>, content_length: Option<usize>) -> Expectation {
        let Some(expect) = expect else {
            return Expectation::None;
        };

        if !expect.trim().eq_ignore_ascii_case("100-continue") {
            return Expectation::Unsupported(expect.to_string());
        }

        match content_length {
            Some(len) if len > self.limit => Expectation::TooLarge,
            _ => Expectation::Continue,
        }
    }
}
