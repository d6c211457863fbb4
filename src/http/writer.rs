use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::headers::Headers;
use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";
const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Serializes a full response. Missing `Content-Length` and `Content-Type`
/// headers are appended after the caller's headers.
pub fn serialize_response(resp: &Response) -> Bytes {
    let mut headers = resp.headers.clone();
    if !headers.contains("Content-Length") {
        headers.append("Content-length", resp.body.len().to_string());
    }
    if !headers.contains("Content-Type") {
        headers.append("Content-type", DEFAULT_CONTENT_TYPE);
    }

    let mut buf = BytesMut::with_capacity(128 + resp.body.len());
    write_head(&mut buf, &resp.status, &headers);
    buf.put_slice(&resp.body);
    buf.freeze()
}

/// Serializes a status line and headers only, with no defaults and no body.
/// Used for interim responses such as `100 Continue`.
pub fn serialize_head(status: &str, headers: &Headers) -> Bytes {
    let mut buf = BytesMut::with_capacity(64);
    write_head(&mut buf, status, headers);
    buf.freeze()
}

fn write_head(buf: &mut BytesMut, status: &str, headers: &Headers) {
    // Status line
    buf.put_slice(HTTP_VERSION.as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(status.as_bytes());
    buf.put_slice(b"\r\n");

    // Headers
    for (k, v) in headers.iter() {
        buf.put_slice(k.as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(v.as_bytes());
        buf.put_slice(b"\r\n");
    }

    // Header/body separator
    buf.put_slice(b"\r\n");
}

/// Serialized bytes waiting to be flushed, with a cursor so a write
/// interrupted by an error does not resend what already went out.
pub struct ResponseWriter {
    buffer: Bytes,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: &Response) -> Self {
        Self::from_bytes(serialize_response(response))
    }

    pub fn head(status: &str, headers: &Headers) -> Self {
        Self::from_bytes(serialize_head(status, headers))
    }

    fn from_bytes(buffer: Bytes) -> Self {
        Self { buffer, written: 0 }
    }

    pub fn is_done(&self) -> bool {
        self.written >= self.buffer.len()
    }

    pub async fn write_to_stream<W>(&mut self, stream: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while self.written < self.buffer.len() {
            let n = stream.write(&self.buffer[self.written..]).await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }

        stream.flush().await?;
        Ok(())
    }
}
