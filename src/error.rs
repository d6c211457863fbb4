//! Per-request failures and the responses they turn into.
//!
//! None of these escape a connection: each is answered on the wire and the
//! connection closes.

use thiserror::Error;

use crate::http::params::DecodeError;
use crate::http::response::Response;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request body exceeds the {limit} byte limit")]
    LimitExceeded { limit: usize },

    #[error("unsupported expectation {0:?}")]
    Expectation(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("{0}")]
    Callback(anyhow::Error),
}

impl RequestError {
    pub fn to_response(&self) -> Response {
        match self {
            RequestError::LimitExceeded { .. } => Response::too_large(),
            RequestError::Expectation(_) => Response::expectation_failed(),
            RequestError::Decode(e) => Response::bad_request(e),
            RequestError::Callback(e) => Response::internal_error(e),
        }
    }
}
