//! Incremental HTTP/1.1 request decoder.
//!
//! [`Decoder::feed`] accepts arbitrary slices of the inbound byte stream and
//! returns the [`Event`]s those bytes completed. The body is never buffered
//! here: every body byte is handed out as soon as it arrives, so the caller
//! can enforce limits before the message is complete.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use crate::http::headers::Headers;
use crate::http::request::{Method, RequestHead};

/// Largest request line plus headers accepted before giving up.
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid request line")]
    InvalidRequest,
    #[error("invalid method token")]
    InvalidMethod,
    #[error("invalid header line")]
    InvalidHeader,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("transfer encodings are not supported")]
    UnsupportedTransferEncoding,
    #[error("request head exceeds {} bytes", MAX_HEAD_SIZE)]
    HeadTooLarge,
}

/// Something the decoder recognised in the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    MessageBegin,
    HeadersComplete(Headers),
    Body(Bytes),
    MessageComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    Idle,
    Head,
    Body { remaining: usize },
    Done,
}

/// Streaming request decoder bound to a single connection.
#[derive(Debug)]
pub struct Decoder {
    state: DecoderState,
    buffer: BytesMut,
    head: Option<RequestHead>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Idle,
            buffer: BytesMut::with_capacity(4096),
            head: None,
        }
    }

    /// Request line and headers of the current message, once parsed.
    pub fn head(&self) -> Option<&RequestHead> {
        self.head.as_ref()
    }

    /// True once `MessageComplete` has been emitted.
    pub fn is_complete(&self) -> bool {
        self.state == DecoderState::Done
    }

    /// Pushes `data` into the decoder and returns the events it completed,
    /// in message order.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Event>, ParseError> {
        let mut events = Vec::new();
        let mut input = data;

        loop {
            match self.state {
                DecoderState::Idle => {
                    // Tolerate stray line breaks before the request line
                    let skip = input
                        .iter()
                        .take_while(|b| **b == b'\r' || **b == b'\n')
                        .count();
                    input = &input[skip..];
                    if input.is_empty() {
                        break;
                    }
                    events.push(Event::MessageBegin);
                    self.state = DecoderState::Head;
                }

                DecoderState::Head => {
                    // Only look at the tail that could complete the terminator
                    let search_from = self.buffer.len().saturating_sub(3);
                    self.buffer.extend_from_slice(input);

                    let Some(end) = find_headers_end(&self.buffer[search_from..])
                        .map(|pos| search_from + pos)
                    else {
                        if self.buffer.len() > MAX_HEAD_SIZE {
                            return Err(ParseError::HeadTooLarge);
                        }
                        break;
                    };
                    if end > MAX_HEAD_SIZE {
                        return Err(ParseError::HeadTooLarge);
                    }

                    let head_bytes = self.buffer.split_to(end + 4);
                    let head = parse_head(&head_bytes[..end])?;
                    let content_length = body_length(&head.headers)?;

                    events.push(Event::HeadersComplete(head.headers.clone()));
                    self.head = Some(head);

                    self.state = if content_length == 0 {
                        DecoderState::Done
                    } else {
                        DecoderState::Body {
                            remaining: content_length,
                        }
                    };
                    if self.state == DecoderState::Done {
                        events.push(Event::MessageComplete);
                        break;
                    }

                    // Whatever followed the head is body
                    let leftover = self.buffer.split();
                    self.drain_body(&leftover, &mut events);
                    break;
                }

                DecoderState::Body { .. } => {
                    self.drain_body(input, &mut events);
                    break;
                }

                // One message per connection; anything after it is ignored
                DecoderState::Done => break,
            }
        }

        Ok(events)
    }

    fn drain_body(&mut self, input: &[u8], events: &mut Vec<Event>) {
        let DecoderState::Body { remaining } = self.state else {
            return;
        };
        if input.is_empty() {
            return;
        }

        let take = remaining.min(input.len());
        events.push(Event::Body(Bytes::copy_from_slice(&input[..take])));

        let remaining = remaining - take;
        if remaining == 0 {
            self.state = DecoderState::Done;
            events.push(Event::MessageComplete);
        } else {
            self.state = DecoderState::Body { remaining };
        }
    }
}

fn parse_head(header_bytes: &[u8]) -> Result<RequestHead, ParseError> {
    let headers_str =
        std::str::from_utf8(header_bytes).map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let target = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    if parts.next().is_some() || !version.starts_with("HTTP/1.") {
        return Err(ParseError::InvalidRequest);
    }

    let method = Method::from_token(method_str).ok_or(ParseError::InvalidMethod)?;

    // Headers
    let mut headers = Headers::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ParseError::InvalidHeader);
        }

        headers.append(key, value.trim());
    }

    Ok(RequestHead {
        method,
        target: target.to_string(),
        version: version.to_string(),
        headers,
    })
}

fn body_length(headers: &Headers) -> Result<usize, ParseError> {
    if headers.contains("Transfer-Encoding") {
        return Err(ParseError::UnsupportedTransferEncoding);
    }

    headers
        .get("Content-Length")
        .map(|v| v.parse::<usize>().map_err(|_| ParseError::InvalidContentLength))
        .transpose()
        .map(|len| len.unwrap_or(0))
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
