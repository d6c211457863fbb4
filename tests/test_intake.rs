use std::sync::Mutex;

use intake::handler::Handler;
use intake::http::params::Params;
use intake::intake::{Emitter, Event, EventIntake};
use rmpv::Value;

#[derive(Default)]
struct Collector {
    events: Mutex<Vec<(String, Event)>>,
}

impl Emitter for Collector {
    fn emit(&self, tag: &str, event: Event) -> anyhow::Result<()> {
        self.events.lock().unwrap().push((tag.to_string(), event));
        Ok(())
    }
}

struct Broken;

impl Emitter for Broken {
    fn emit(&self, _tag: &str, _event: Event) -> anyhow::Result<()> {
        anyhow::bail!("buffer full")
    }
}

fn pack(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, value).unwrap();
    buf
}

fn map(entries: Vec<(Value, Value)>) -> Value {
    Value::Map(entries)
}

fn params(pairs: &[(&str, &[u8])]) -> Params {
    let mut params = Params::new();
    for (k, v) in pairs {
        params.insert(*k, v.to_vec());
    }
    params
}

#[test]
fn test_json_record_is_emitted() {
    let intake = EventIntake::new(Collector::default());

    let response = intake
        .handle("/app/access", &params(&[("json", br#"{"user":"alice"}"#), ("time", b"1700000000")]))
        .unwrap();

    assert_eq!(response.status, "200 OK");
    assert!(response.body.is_empty());

    let events = intake.emitter().events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "app.access");
    assert_eq!(events[0].1.time, 1_700_000_000);
    assert_eq!(events[0].1.record, map(vec![("user".into(), "alice".into())]));
}

#[test]
fn test_msgpack_wins_over_json() {
    let intake = EventIntake::new(Collector::default());
    let packed = pack(&map(vec![("from".into(), "msgpack".into())]));

    intake
        .handle("/t", &params(&[("msgpack", &packed[..]), ("json", br#"{"from":"json"}"#)]))
        .unwrap();

    let events = intake.emitter().events.lock().unwrap();
    assert_eq!(events[0].1.record, map(vec![("from".into(), "msgpack".into())]));
}

#[test]
fn test_msgpack_keeps_integer_keys_and_binary() {
    let intake = EventIntake::new(Collector::default());
    let record = map(vec![
        (Value::from(1), "a".into()),
        ("b".into(), Value::Binary(vec![0xff, 0x00])),
        ("c".into(), Value::Ext(5, vec![1, 2, 3])),
    ]);
    let packed = pack(&record);

    let response = intake.handle("/t", &params(&[("msgpack", &packed[..])])).unwrap();

    assert_eq!(response.status, "200 OK");
    let events = intake.emitter().events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1.record, record);
}

#[test]
fn test_msgpack_with_trailing_bytes_is_bad_request() {
    let intake = EventIntake::new(Collector::default());
    let mut packed = pack(&map(vec![("a".into(), 1.into())]));
    packed.push(0xc0);

    let response = intake.handle("/t", &params(&[("msgpack", &packed[..])])).unwrap();

    assert_eq!(response.status, "400 Bad Request");
    assert!(intake.emitter().events.lock().unwrap().is_empty());
}

#[test]
fn test_success_leaves_headers_to_the_writer() {
    let intake = EventIntake::new(Collector::default());

    let response = intake.handle("/t", &params(&[("json", b"{}")])).unwrap();

    assert!(response.headers.is_empty());
}

#[test]
fn test_missing_time_uses_now() {
    let intake = EventIntake::new(Collector::default());

    intake
        .handle("/t", &params(&[("json", b"{}"), ("time", b"0")]))
        .unwrap();
    intake.handle("/t", &params(&[("json", b"{}")])).unwrap();

    let events = intake.emitter().events.lock().unwrap();
    assert!(events.iter().all(|(_, e)| e.time > 1_600_000_000));
}

#[test]
fn test_missing_record_is_bad_request() {
    let intake = EventIntake::new(Collector::default());

    let response = intake.handle("/t", &params(&[("other", b"1")])).unwrap();

    assert_eq!(response.status, "400 Bad Request");
    assert_eq!(
        &response.body[..],
        b"400 Bad Request\n'json' or 'msgpack' parameter is required\n"
    );
    assert!(intake.emitter().events.lock().unwrap().is_empty());
}

#[test]
fn test_invalid_json_is_bad_request() {
    let intake = EventIntake::new(Collector::default());

    let response = intake.handle("/t", &params(&[("json", b"{not json")])).unwrap();

    assert_eq!(response.status, "400 Bad Request");
}

#[test]
fn test_emitter_failure_is_server_error() {
    let intake = EventIntake::new(Broken);

    let response = intake.handle("/t", &params(&[("json", b"{}")])).unwrap();

    assert_eq!(response.status, "500 Internal Server Error");
    assert_eq!(&response.body[..], b"500 Internal Server Error\nbuffer full\n");
}
