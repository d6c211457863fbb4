use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::RequestError;
use crate::handler::Handler;
use crate::http::guard::{Admission, BodyGuard, Expectation};
use crate::http::headers::Headers;
use crate::http::params::materialize;
use crate::http::parser::{Decoder, Event, ParseError};
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;

const READ_BUFFER_SIZE: usize = 8192;

/// What every connection accepted by one listener shares. Nothing in here
/// changes after the listener starts.
#[derive(Clone)]
pub struct ConnectionContext {
    pub body_size_limit: usize,
    pub idle_timeout: Option<Duration>,
    pub handler: Arc<dyn Handler>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingMessage,
    ReceivingBody,
    Complete,
    Closing,
    Closed,
}

/// One accepted socket and the single request it will serve.
pub struct Connection<S> {
    stream: S,
    decoder: Decoder,
    guard: BodyGuard,
    body: BytesMut,
    content_type: Option<String>,
    state: ConnectionState,
    closing: bool,
    outbound: VecDeque<ResponseWriter>,
    ctx: ConnectionContext,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, ctx: ConnectionContext) -> Self {
        Self {
            stream,
            decoder: Decoder::new(),
            guard: BodyGuard::new(ctx.body_size_limit),
            body: BytesMut::new(),
            content_type: None,
            state: ConnectionState::AwaitingMessage,
            closing: false,
            outbound: VecDeque::new(),
            ctx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True once a response that ends the connection has been queued.
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

        while self.state != ConnectionState::Closed {
            buf.clear();

            let Some(n) = self.read(&mut buf).await? else {
                debug!("idle timeout, closing");
                self.close().await;
                break;
            };

            if n == 0 {
                debug!("peer closed connection");
                self.close().await;
                break;
            }

            if let Err(e) = self.on_read(&buf) {
                warn!(error = %e, "malformed request, closing");
                self.close().await;
                break;
            }

            self.flush().await?;
        }

        Ok(())
    }

    async fn read(&mut self, buf: &mut BytesMut) -> std::io::Result<Option<usize>> {
        match self.ctx.idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.stream.read_buf(buf)).await {
                Ok(res) => res.map(Some),
                Err(_) => Ok(None),
            },
            None => self.stream.read_buf(buf).await.map(Some),
        }
    }

    /// Feeds inbound bytes to the decoder and reacts to what it recognised.
    /// Once the connection is closing, input is dropped unread.
    pub fn on_read(&mut self, data: &[u8]) -> Result<(), ParseError> {
        if self.closing {
            return Ok(());
        }

        for event in self.decoder.feed(data)? {
            self.on_event(event);
        }
        Ok(())
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::MessageBegin => self.on_message_begin(),
            Event::HeadersComplete(headers) => self.on_headers_complete(&headers),
            Event::Body(chunk) => self.on_body(chunk),
            Event::MessageComplete => self.on_message_complete(),
        }
    }

    fn on_message_begin(&mut self) {
        self.body.clear();
        self.guard.reset();
        self.content_type = None;
        self.state = ConnectionState::ReceivingBody;
    }

    fn on_headers_complete(&mut self, headers: &Headers) {
        self.content_type = headers.get("Content-Type").map(str::to_string);

        let content_length = headers
            .get("Content-Length")
            .and_then(|v| v.trim().parse::<usize>().ok());

        match self.guard.expectation(headers.get("Expect"), content_length) {
            Expectation::None => {}
            Expectation::Continue => {
                debug!("sending 100 Continue");
                self.send_head(StatusCode::Continue);
            }
            Expectation::TooLarge => self.reject(RequestError::LimitExceeded {
                limit: self.guard.limit(),
            }),
            Expectation::Unsupported(value) => self.reject(RequestError::Expectation(value)),
        }
    }

    fn on_body(&mut self, chunk: Bytes) {
        if self.closing {
            return;
        }

        match self.guard.admit(chunk.len()) {
            Admission::Accept => self.body.extend_from_slice(&chunk),
            Admission::Reject => self.reject(RequestError::LimitExceeded {
                limit: self.guard.limit(),
            }),
        }
    }

    fn on_message_complete(&mut self) {
        if self.closing {
            return;
        }
        self.state = ConnectionState::Complete;

        let response = match self.dispatch() {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "request failed");
                e.to_response()
            }
        };

        self.send_response_and_close(response);
    }

    /// Materializes the finished request and hands it to the application.
    fn dispatch(&self) -> Result<Response, RequestError> {
        let Some(head) = self.decoder.head() else {
            return Err(RequestError::Callback(anyhow::anyhow!(
                "message completed without a request line"
            )));
        };

        let params = materialize(head.query(), self.content_type.as_deref(), &self.body)?;
        let path = head.path();
        let handler = &self.ctx.handler;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(path, &params)));
        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(RequestError::Callback(e)),
            Err(_) => {
                return Err(RequestError::Callback(anyhow::anyhow!("handler panicked")));
            }
        };

        info!(
            method = head.method.as_str(),
            path,
            params = params.len(),
            body_bytes = self.body.len(),
            status = %response.status,
            "request handled"
        );

        Ok(response)
    }

    fn reject(&mut self, err: RequestError) {
        if self.closing {
            return;
        }
        warn!(error = %err, "rejecting request");
        self.send_response_and_close(err.to_response());
    }

    fn send_head(&mut self, status: StatusCode) {
        self.outbound
            .push_back(ResponseWriter::head(&status.status_line(), &Headers::new()));
    }

    /// Queues the final response. Only the first call on a connection has
    /// any effect.
    fn send_response_and_close(&mut self, response: Response) {
        if self.closing {
            return;
        }
        self.outbound.push_back(ResponseWriter::new(&response));
        self.closing = true;
        self.state = ConnectionState::Closing;
    }

    /// Writes everything queued so far, then closes the socket if the final
    /// response was among it.
    pub async fn flush(&mut self) -> anyhow::Result<()> {
        while let Some(mut writer) = self.outbound.pop_front() {
            writer.write_to_stream(&mut self.stream).await?;
        }

        if self.closing {
            self.close().await;
        }
        Ok(())
    }

    /// Shuts the socket down. Closing an already closed connection does nothing.
    pub async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "shutdown failed");
        }
        self.state = ConnectionState::Closed;
    }
}
