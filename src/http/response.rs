use bytes::Bytes;

use crate::http::headers::Headers;

/// HTTP statuses the input produces on its own.
///
/// Application callbacks are free to answer with any status text; these are
/// the ones the connection crafts itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 100 Continue
    Continue,
    /// 200 OK
    Ok,
    /// 400 Bad Request
    BadRequest,
    /// 413 Request Entity Too Large
    PayloadTooLarge,
    /// 417 Expectation Failed
    ExpectationFailed,
    /// 500 Internal Server Error
    InternalServerError,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use intake::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::PayloadTooLarge.as_u16(), 413);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Continue => 100,
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::PayloadTooLarge => 413,
            StatusCode::ExpectationFailed => 417,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Returns the reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Continue => "Continue",
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::PayloadTooLarge => "Request Entity Too Large",
            StatusCode::ExpectationFailed => "Expectation Failed",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }

    /// Status text as it appears after the version on the status line,
    /// e.g. `"413 Request Entity Too Large"`.
    pub fn status_line(&self) -> String {
        format!("{} {}", self.as_u16(), self.reason_phrase())
    }
}

impl From<StatusCode> for String {
    fn from(status: StatusCode) -> Self {
        status.status_line()
    }
}

/// A response produced by an application callback or crafted by the
/// connection.
///
/// `Content-Length` and `Content-Type` are filled in by the writer when the
/// headers leave them out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status text, e.g. `"200 OK"`
    pub status: String,
    /// Headers in the order they will be written
    pub headers: Headers,
    /// Response body as bytes
    pub body: Bytes,
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```
/// # use intake::http::response::{ResponseBuilder, StatusCode};
/// let response = ResponseBuilder::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body("{}")
///     .build();
/// assert_eq!(response.status, "200 OK");
/// ```
pub struct ResponseBuilder {
    status: String,
    headers: Headers,
    body: Bytes,
}

impl ResponseBuilder {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Adds or replaces a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Response {
        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Response {
    /// Creates a 200 OK response with the given body.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        ResponseBuilder::new(StatusCode::Ok).body(body).build()
    }

    /// Creates a 400 Bad Request response echoing `message`.
    pub fn bad_request(message: impl std::fmt::Display) -> Self {
        Self::diagnostic(StatusCode::BadRequest, message)
    }

    /// Creates a 500 Internal Server Error response echoing `message`.
    pub fn internal_error(message: impl std::fmt::Display) -> Self {
        Self::diagnostic(StatusCode::InternalServerError, message)
    }

    /// Creates a 413 response for a body over the size limit.
    pub fn too_large() -> Self {
        ResponseBuilder::new(StatusCode::PayloadTooLarge)
            .body("Too large")
            .build()
    }

    /// Creates a 417 response for an unsupported `Expect` value.
    pub fn expectation_failed() -> Self {
        ResponseBuilder::new(StatusCode::ExpectationFailed).build()
    }

    fn diagnostic(status: StatusCode, message: impl std::fmt::Display) -> Self {
        let body = format!("{}\n{}\n", status.status_line(), message);
        ResponseBuilder::new(status)
            .header("Content-type", "text/plain")
            .body(body)
            .build()
    }
}
