//! Default application callback: turns each request into a tagged event.
//!
//! `POST /app.access?json={"user":"alice"}` (or the same parameters in a
//! form body) yields an event tagged `app.access`. The record comes from
//! the `msgpack` parameter if present, otherwise from `json`; `time`
//! optionally pins the event time in Unix seconds.

use std::time::{SystemTime, UNIX_EPOCH};

use rmpv::Value;
use tracing::info;

use crate::handler::Handler;
use crate::http::params::Params;
use crate::http::response::Response;

/// One decoded record and the time it is stamped with.
///
/// Records are kept as MessagePack values, which can hold everything a
/// MessagePack payload can (non-string map keys, binary, extension types);
/// JSON records are converted on the way in.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub time: u64,
    pub record: Value,
}

/// Where accepted events go.
pub trait Emitter: Send + Sync + 'static {
    fn emit(&self, tag: &str, event: Event) -> anyhow::Result<()>;
}

/// Writes every event to the log.
#[derive(Debug, Default)]
pub struct LogEmitter;

impl Emitter for LogEmitter {
    fn emit(&self, tag: &str, event: Event) -> anyhow::Result<()> {
        info!(tag, time = event.time, record = %event.record, "event");
        Ok(())
    }
}

pub struct EventIntake<E> {
    emitter: E,
}

impl<E: Emitter> EventIntake<E> {
    pub fn new(emitter: E) -> Self {
        Self { emitter }
    }

    pub fn emitter(&self) -> &E {
        &self.emitter
    }
}

impl<E: Emitter> Handler for EventIntake<E> {
    fn handle(&self, path: &str, params: &Params) -> anyhow::Result<Response> {
        let tag = tag_for_path(path);

        let event = match decode_event(params) {
            Ok(event) => event,
            Err(e) => return Ok(Response::bad_request(e)),
        };

        if let Err(e) = self.emitter.emit(&tag, event) {
            return Ok(Response::internal_error(e));
        }

        Ok(Response::ok(""))
    }
}

/// `/foo/bar` becomes `foo.bar`.
pub fn tag_for_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

fn decode_event(params: &Params) -> anyhow::Result<Event> {
    let record = if let Some(raw) = params.get("msgpack") {
        decode_msgpack(raw).map_err(|e| anyhow::anyhow!("invalid msgpack parameter: {e}"))?
    } else if let Some(raw) = params.get("json") {
        serde_json::from_slice::<Value>(raw)
            .map_err(|e| anyhow::anyhow!("invalid json parameter: {e}"))?
    } else {
        anyhow::bail!("'json' or 'msgpack' parameter is required");
    };

    let time = params
        .get_str("time")
        .and_then(|t| t.trim().parse::<u64>().ok())
        .filter(|t| *t != 0)
        .unwrap_or_else(now);

    Ok(Event { time, record })
}

/// Decodes exactly one MessagePack object.
fn decode_msgpack(raw: &[u8]) -> anyhow::Result<Value> {
    let mut rest = raw;
    let value = rmpv::decode::read_value(&mut rest)?;
    if !rest.is_empty() {
        anyhow::bail!("{} extra bytes after the object", rest.len());
    }
    Ok(value)
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
