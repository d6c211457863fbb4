//! Drives the connection state machine over an in-memory pipe.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use intake::handler::Handler;
use intake::http::connection::{Connection, ConnectionContext};
use intake::http::params::Params;
use intake::http::response::{Response, ResponseBuilder};
use percent_encoding::{NON_ALPHANUMERIC, percent_encode};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

type Calls = Arc<Mutex<Vec<(String, Params)>>>;

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";
const EMPTY_OK: &str = "HTTP/1.1 200 OK\r\nContent-length: 0\r\nContent-type: text/plain\r\n\r\n";
const TOO_LARGE: &str =
    "HTTP/1.1 413 Request Entity Too Large\r\nContent-length: 9\r\nContent-type: text/plain\r\n\r\nToo large";

fn recording() -> (Calls, Arc<dyn Handler>) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    let handler = move |path: &str, params: &Params| -> anyhow::Result<Response> {
        sink.lock().unwrap().push((path.to_string(), params.clone()));
        Ok(ResponseBuilder::new("200 OK").build())
    };
    (calls, Arc::new(handler))
}

fn spawn_connection(
    limit: usize,
    handler: Arc<dyn Handler>,
) -> (DuplexStream, JoinHandle<anyhow::Result<()>>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let ctx = ConnectionContext {
        body_size_limit: limit,
        idle_timeout: None,
        handler,
    };
    let task = tokio::spawn(Connection::new(server, ctx).run());
    (client, task)
}

async fn exchange(limit: usize, handler: Arc<dyn Handler>, request: &[u8]) -> String {
    let (mut client, task) = spawn_connection(limit, handler);

    client.write_all(request).await.unwrap();
    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    task.await.unwrap().unwrap();

    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn test_msgpack_query_reaches_handler_as_raw_bytes() {
    let mut record = Vec::new();
    let value = rmpv::Value::Map(vec![("a".into(), 1.into())]);
    rmpv::encode::write_value(&mut record, &value).unwrap();
    let request = format!(
        "GET /foo/bar?msgpack={} HTTP/1.1\r\nHost: localhost\r\n\r\n",
        percent_encode(&record, NON_ALPHANUMERIC)
    );
    let (calls, handler) = recording();

    let response = exchange(1024, handler, request.as_bytes()).await;

    assert_eq!(response, EMPTY_OK);
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "/foo/bar");
    assert_eq!(calls[0].1.get("msgpack"), Some(&record[..]));
}

#[tokio::test]
async fn test_form_body_overrides_query() {
    let (calls, handler) = recording();
    let request = b"POST /tag?a=1&b=2 HTTP/1.1\r\n\
Content-Type: application/x-www-form-urlencoded\r\n\
Content-Length: 3\r\n\
\r\n\
b=3";

    let response = exchange(1024, handler, request).await;

    assert_eq!(response, EMPTY_OK);
    let calls = calls.lock().unwrap();
    assert_eq!(calls[0].1.get_str("a"), Some("1"));
    assert_eq!(calls[0].1.get_str("b"), Some("3"));
}

#[tokio::test]
async fn test_body_at_limit_is_accepted() {
    let (calls, handler) = recording();
    let request = b"POST / HTTP/1.1\r\nContent-Length: 8\r\n\r\n12345678";

    let response = exchange(8, handler, request).await;

    assert_eq!(response, EMPTY_OK);
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_body_over_limit_gets_413() {
    let (calls, handler) = recording();
    let request = b"POST / HTTP/1.1\r\nContent-Length: 20\r\n\r\n01234567890123456789";

    let response = exchange(8, handler, request).await;

    assert_eq!(response, TOO_LARGE);
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_413_is_sent_once_across_chunks() {
    let (calls, handler) = recording();
    let (mut client, task) = spawn_connection(8, handler);

    client
        .write_all(b"POST / HTTP/1.1\r\nContent-Length: 30\r\n\r\n123456")
        .await
        .unwrap();
    for _ in 0..4 {
        // The server may already have hung up
        let _ = client.write_all(b"123456").await;
    }

    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    task.await.unwrap().unwrap();

    let text = String::from_utf8(out).unwrap();
    assert_eq!(text, TOO_LARGE);
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_expect_continue_within_limit() {
    let (calls, handler) = recording();
    let (mut client, task) = spawn_connection(16, handler);

    client
        .write_all(
            b"POST /x HTTP/1.1\r\nExpect: 100-continue\r\n\
Content-Type: application/x-www-form-urlencoded\r\nContent-Length: 3\r\n\r\n",
        )
        .await
        .unwrap();

    let mut interim = vec![0u8; CONTINUE.len()];
    client.read_exact(&mut interim).await.unwrap();
    assert_eq!(interim, CONTINUE);

    client.write_all(b"k=v").await.unwrap();
    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    task.await.unwrap().unwrap();

    assert_eq!(String::from_utf8(out).unwrap(), EMPTY_OK);
    assert_eq!(calls.lock().unwrap()[0].1.get_str("k"), Some("v"));
}

#[tokio::test]
async fn test_expect_continue_over_limit() {
    let (calls, handler) = recording();
    let request = b"POST / HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 100\r\n\r\n";

    let response = exchange(16, handler, request).await;

    assert_eq!(response, TOO_LARGE);
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_expectation_gets_417() {
    let (calls, handler) = recording();
    let request = b"POST / HTTP/1.1\r\nExpect: bananas\r\nContent-Length: 2\r\n\r\nhi";

    let response = exchange(16, handler, request).await;

    assert_eq!(
        response,
        "HTTP/1.1 417 Expectation Failed\r\nContent-length: 0\r\nContent-type: text/plain\r\n\r\n"
    );
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_handler_error_gets_500() {
    let handler = |_: &str, _: &Params| -> anyhow::Result<Response> {
        anyhow::bail!("emitter unavailable")
    };

    let response = exchange(16, Arc::new(handler), b"GET / HTTP/1.1\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    assert!(response.ends_with("\r\n\r\n500 Internal Server Error\nemitter unavailable\n"));
}

#[tokio::test]
async fn test_handler_panic_gets_500() {
    let handler = |_: &str, _: &Params| -> anyhow::Result<Response> { panic!("boom") };

    let response = exchange(16, Arc::new(handler), b"GET / HTTP/1.1\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
}

#[tokio::test]
async fn test_multipart_without_boundary_gets_400() {
    let (calls, handler) = recording();
    let request = b"POST / HTTP/1.1\r\nContent-Type: multipart/form-data\r\nContent-Length: 1\r\n\r\nx";

    let response = exchange(16, handler, request).await;

    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(response.contains("boundary"));
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_extension_method_reaches_handler() {
    let (calls, handler) = recording();

    let response = exchange(16, handler, b"TRACE /trace/path?a=1 HTTP/1.1\r\n\r\n").await;

    assert_eq!(response, EMPTY_OK);
    let calls = calls.lock().unwrap();
    assert_eq!(calls[0].0, "/trace/path");
    assert_eq!(calls[0].1.get_str("a"), Some("1"));
}

#[tokio::test]
async fn test_malformed_request_closes_silently() {
    let (calls, handler) = recording();

    let response = exchange(16, handler, b"NOT A REQUEST\r\n\r\n").await;

    assert_eq!(response, "");
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_peer_hangup_mid_request() {
    let (calls, handler) = recording();
    let (mut client, task) = spawn_connection(16, handler);

    client
        .write_all(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc")
        .await
        .unwrap();
    client.shutdown().await.unwrap();

    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    task.await.unwrap().unwrap();

    assert!(out.is_empty());
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_idle_timeout_closes_connection() {
    let (_calls, handler) = recording();
    let (mut client, server) = tokio::io::duplex(1024);
    let ctx = ConnectionContext {
        body_size_limit: 16,
        idle_timeout: Some(Duration::from_millis(50)),
        handler,
    };
    let task = tokio::spawn(Connection::new(server, ctx).run());

    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    task.await.unwrap().unwrap();

    assert!(out.is_empty());
}
