//! The application callback invoked once per accepted request.

use crate::http::params::Params;
use crate::http::response::Response;

/// Receives every request that parsed cleanly and stayed within the body
/// limit.
///
/// An `Err` is answered with `500 Internal Server Error` and the error
/// message in the body. Handlers that want a different status (for example
/// a 400 for a missing parameter) return it as an `Ok` response.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, path: &str, params: &Params) -> anyhow::Result<Response>;
}

impl<F> Handler for F
where
    F: Fn(&str, &Params) -> anyhow::Result<Response> + Send + Sync + 'static,
{
    fn handle(&self, path: &str, params: &Params) -> anyhow::Result<Response> {
        self(path, params)
    }
}
