//! Transport behavior over in-memory streams and recorded traces

use pfeiffer_core::core::protocol::DEFAULT_MAX_LINE_LEN;
use pfeiffer_core::core::transport::{LiveTransport, TraceRecorder};
use pfeiffer_core::{
    open_transport, CatalogSet, DeviceMap, Error, Message, Payload, Transport, TransportKind,
    Value, Violation,
};
use std::io::{Cursor, Write};

fn live(bytes: &[u8]) -> Transport {
    let source = LiveTransport::from_stream("memory", Cursor::new(bytes.to_vec()), DEFAULT_MAX_LINE_LEN);
    Transport::new(Box::new(source), CatalogSet::builtin().unwrap())
}

fn tc110_at_1() -> DeviceMap {
    DeviceMap::new().with_device(1, "TC110").unwrap()
}

#[test]
fn test_concatenated_frames_yield_in_order() {
    let mut transport = live(b"0011000106111111015\r0021030906000633033\r");
    let devices = tc110_at_1();

    let first = transport.next_message(&devices).unwrap();
    assert_eq!(first.decoded().unwrap().payload, Payload::Value(Value::Bool(true)));

    // Address 2 is not mapped
    let second = transport.next_message(&devices).unwrap();
    assert!(matches!(second, Message::Raw(ref raw) if raw.address == 2 && raw.param == 309));

    assert!(matches!(
        transport.next_message(&devices),
        Err(Error::Communication(_))
    ));
}

#[test]
fn test_nul_byte_mid_frame() {
    let mut transport = live(b"00110\x0000106111111015\r0010000102=?096\r");
    let devices = tc110_at_1();

    let err = transport.next_message(&devices).unwrap_err();
    assert!(matches!(
        err.violation(),
        Some(Violation::IllegalByte { byte: 0, .. })
    ));

    // The rest of the broken frame is read as its own (invalid) line
    assert!(transport.next_message(&devices).unwrap_err().is_protocol_violation());
    let query = transport.next_message(&devices).unwrap();
    assert_eq!(query.decoded().unwrap().payload, Payload::NotApplicable);
}

fn write_trace(records: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for record in records {
        writeln!(file, "{}", record).unwrap();
    }
    file.flush().unwrap();
    file
}

#[test]
fn test_replay_is_deterministic() {
    let trace = write_trace(&[
        r#"{"packetRaw":"0011000106111111015\r"}"#,
        r#"{"packetRaw":"0021030906000633033\r","timestamp":"2021-05-04T12:00:00+02:00"}"#,
        r#"{"packetRaw":"0011099906000001036\r","decoded":{"anything":true}}"#,
    ]);
    let devices = tc110_at_1();
    let catalogs = CatalogSet::builtin().unwrap();

    let mut runs = Vec::new();
    for _ in 0..2 {
        let mut transport =
            open_transport(TransportKind::replay(trace.path()), catalogs.clone()).unwrap();
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(match transport.next_message(&devices) {
                Ok(message) => format!("ok {}", message.raw().packet_raw),
                Err(e) => format!("err {}", e),
            });
        }
        assert!(transport.next_message(&devices).unwrap_err().is_simulation_complete());
        assert!(transport.next_message(&devices).unwrap_err().is_simulation_complete());
        runs.push(seen);
    }

    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[0][0], "ok 0011000106111111015\r");
    assert_eq!(runs[0][1], "ok 0021030906000633033\r");
    assert!(runs[0][2].starts_with("err Unknown register 999"));
}

#[test]
fn test_replay_cannot_transmit() {
    let trace = write_trace(&[]);
    let catalogs = CatalogSet::builtin().unwrap();
    let frame = pfeiffer_core::build_query(1, 1, catalogs.catalog("TC110").unwrap()).unwrap();
    let mut transport = open_transport(TransportKind::replay(trace.path()), catalogs).unwrap();

    assert!(matches!(transport.send(&frame), Err(Error::Communication(_))));
    assert!(transport.next_message(&DeviceMap::new()).unwrap_err().is_simulation_complete());
}

#[test]
fn test_recorded_session_replays() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.jsonl");
    let devices = tc110_at_1();

    let mut source = live(b"0011000106111111015\r0010000102=?096\r");
    let mut recorder = TraceRecorder::create(&path).unwrap();
    for _ in 0..2 {
        let message = source.next_message(&devices).unwrap();
        recorder
            .record_line(&message.raw().packet_raw, message.decoded())
            .unwrap();
    }
    recorder.finish().unwrap();

    let mut replay = open_transport(TransportKind::replay(&path), CatalogSet::builtin().unwrap()).unwrap();
    let first = replay.next_message(&devices).unwrap();
    assert_eq!(first.decoded().unwrap().label(), "Heating");
    let second = replay.next_message(&devices).unwrap();
    assert_eq!(second.raw().payload_raw, "=?");
    assert!(replay.next_message(&devices).unwrap_err().is_simulation_complete());
}

#[test]
fn test_missing_catalog_in_device_map() {
    let devices = DeviceMap::new().with_device(3, "TC999").unwrap();
    assert!(matches!(
        devices.validate(&CatalogSet::builtin().unwrap()),
        Err(Error::UnknownCatalog(_))
    ));
}
