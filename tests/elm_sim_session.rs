use elm_obd::{
    connection::ConnectionState,
    dtc::MonitorState,
    hardware::simulation::{RecordingSleeper, SimulatedElm},
    helpers::decode_hex_bytes,
    ConnectionManager, ConnectionOptions, DiagError, DiagServerResult, DiagnosticSession,
    DtcOrigin, LogHandler, Sensor, SensorReading, TroubleCode,
};

struct EngineRpm;

impl Sensor for EngineRpm {
    type Value = f32;

    fn name(&self) -> &str {
        "Engine speed"
    }

    fn unit(&self) -> &str {
        "rpm"
    }

    fn command(&self) -> &str {
        "010C"
    }

    fn decode(&self, payload: &str) -> DiagServerResult<f32> {
        let bytes = decode_hex_bytes(payload)?;
        match bytes.as_slice() {
            [a, b, ..] => Ok(((*a as f32) * 256.0 + *b as f32) / 4.0),
            _ => Err(DiagError::InvalidResponse(payload.to_string())),
        }
    }
}

fn connected_session(sim: &SimulatedElm) -> DiagnosticSession<LogHandler> {
    let _ = env_logger::builder().is_test(true).try_init();
    let opts = ConnectionOptions {
        read_delay_ms: 0,
        ..Default::default()
    };
    let mgr = ConnectionManager::new(sim.clone(), opts, LogHandler)
        .with_sleeper(RecordingSleeper::new());
    let mut session = DiagnosticSession::new(mgr);
    session.connect().unwrap();
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(session.device_id(), "ELM327 v1.5");
    session
}

fn code(s: &str) -> TroubleCode {
    s.parse().unwrap()
}

#[test]
fn read_stored_and_freeze_frame_codes() {
    let sim = SimulatedElm::with_handshake();
    sim.add_response("0101", "41 01 82 07 FF 00");
    sim.add_response("03", "43 01 33 02 00 00 00");
    sim.add_response("07", "47 01 71 00 00 00 00");
    let mut session = connected_session(&sim);

    let codes = session.read_trouble_codes().unwrap();
    let listed: Vec<(String, DtcOrigin)> = codes
        .iter()
        .map(|r| (r.code.to_string(), r.origin))
        .collect();
    assert_eq!(
        listed,
        vec![
            ("P0133".to_string(), DtcOrigin::Active),
            ("P0200".to_string(), DtcOrigin::Active),
            ("P0171".to_string(), DtcOrigin::Passive),
        ]
    );
}

#[test]
fn one_request_per_three_codes() {
    let sim = SimulatedElm::with_handshake();
    sim.add_response("0101", "41 01 84 07 FF 00");
    sim.add_response("03", "43 01 33 02 00 C1 23");
    sim.add_response("03", "43 01 71 00 00 00 00");
    sim.add_response("07", "NO DATA");
    let mut session = connected_session(&sim);

    let codes = session.read_trouble_codes().unwrap();
    assert_eq!(
        codes.iter().map(|r| r.code).collect::<Vec<_>>(),
        vec![code("P0133"), code("P0200"), code("U0123"), code("P0171")]
    );
    assert!(codes.iter().all(|r| r.origin == DtcOrigin::Active));
    let stored_reads = sim.sent_commands().iter().filter(|c| *c == "03").count();
    assert_eq!(stored_reads, 2);
    assert_eq!(sim.sent_commands().last().map(String::as_str), Some("07"));
}

#[test]
fn no_stored_codes_skips_service_03() {
    let sim = SimulatedElm::with_handshake();
    sim.add_response("0101", "41 01 00 07 FF 00");
    sim.add_response("07", "NO DATA");
    let mut session = connected_session(&sim);

    assert!(session.read_trouble_codes().unwrap().is_empty());
    assert!(!sim.sent_commands().iter().any(|c| c == "03"));
}

#[test]
fn monitor_status() {
    let sim = SimulatedElm::with_handshake();
    sim.add_response("0101", "41 01 81 07 FF 00");
    let mut session = connected_session(&sim);

    let report = session.read_monitor_status().unwrap();
    assert_eq!(report.code_count, 1);
    assert!(report.mil_on);
    assert_eq!(report.mil_text(), "On");
    assert_eq!(report.continuous_monitors, [1, 1, 1]);
    assert_eq!(report.continuous_states(), [MonitorState::Complete; 3]);
    assert_eq!(report.once_only_monitors, [1; 7]);

    let (mil, tests) = session.read_monitor_tests().unwrap();
    assert_eq!(mil, "On");
    assert_eq!(tests.len(), 10);
    assert!(tests.iter().all(|t| t.state.to_string() == "Supported - Completed"));
}

#[test]
fn clear_codes_returns_raw_acknowledgement() {
    let sim = SimulatedElm::with_handshake();
    sim.add_response("04", "44");
    let mut session = connected_session(&sim);
    assert_eq!(session.clear_trouble_codes().unwrap(), "44");
}

#[test]
fn sensors() {
    let sim = SimulatedElm::with_handshake();
    sim.add_response("010C", "41 0C 1A F8");
    sim.add_response("010C", "NO DATA");
    let mut session = connected_session(&sim);

    let named = session.sensor(&EngineRpm).unwrap();
    assert_eq!(named.name, "Engine speed");
    assert_eq!(named.unit, "rpm");
    assert_eq!(named.reading, SensorReading::Value(1726.0));

    assert_eq!(session.read_sensor(&EngineRpm).unwrap(), SensorReading::NoData);
}

#[test]
fn short_sensor_response_is_invalid() {
    let sim = SimulatedElm::with_handshake();
    sim.add_response("010C", "41 0C");
    let mut session = connected_session(&sim);
    assert!(matches!(
        session.read_sensor(&EngineRpm),
        Err(DiagError::InvalidResponse(_))
    ));
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[test]
fn cancelled_read_keeps_connection() {
    let sim = SimulatedElm::with_handshake();
    sim.add_response("0101", "41 01 00 07 FF 00");
    let mut session = connected_session(&sim);

    let token = session.cancel_token();
    token.cancel();
    assert!(matches!(session.read_monitor_status(), Err(DiagError::Cancelled)));
    assert_eq!(session.state(), ConnectionState::Connected);

    token.reset();
    assert_eq!(session.read_monitor_status().unwrap().code_count, 0);
}

#[test]
fn close_and_reconnect() {
    let sim = SimulatedElm::with_handshake();
    let mut session = connected_session(&sim);
    assert!(!session.supported_pids().unwrap().is_empty());

    session.close();
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(matches!(
        session.read_monitor_status(),
        Err(DiagError::NotConnected(ConnectionState::Disconnected))
    ));

    session.connect().unwrap();
    assert_eq!(sim.open_count(), 2);
}

#[test]
fn stored_code_reads_stop_at_no_data() {
    let sim = SimulatedElm::with_handshake();
    sim.add_response("0101", "41 01 87 07 FF 00");
    sim.add_response("03", "43 01 33 02 00 C1 23");
    sim.add_response("03", "NO DATA");
    sim.add_response("07", "NO DATA");
    let mut session = connected_session(&sim);

    let codes = session.read_trouble_codes().unwrap();
    assert_eq!(
        codes.iter().map(|r| r.code).collect::<Vec<_>>(),
        vec![code("P0133"), code("P0200"), code("U0123")]
    );
    // 7 codes would need 3 requests, reading stops after the empty block
    let stored_reads = sim.sent_commands().iter().filter(|c| *c == "03").count();
    assert_eq!(stored_reads, 2);
    assert_eq!(sim.sent_commands().last().map(String::as_str), Some("07"));
}

#[test]
fn malformed_stored_block_is_rejected() {
    let sim = SimulatedElm::with_handshake();
    sim.add_response("0101", "41 01 82 07 FF 00");
    sim.add_response("03", "43 01 3Z 02 00 00 00");
    let mut session = connected_session(&sim);

    assert!(matches!(
        session.read_trouble_codes(),
        Err(DiagError::MalformedPayload { expected: 12, .. })
    ));
    assert!(!sim.sent_commands().iter().any(|c| c == "07"));
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[test]
fn malformed_freeze_frame_block_is_rejected() {
    let sim = SimulatedElm::with_handshake();
    sim.add_response("0101", "41 01 81 07 FF 00");
    sim.add_response("03", "43 01 33 00 00 00 00");
    sim.add_response("07", "47 01 33");
    let mut session = connected_session(&sim);

    assert!(matches!(
        session.read_trouble_codes(),
        Err(DiagError::MalformedPayload { expected: 12, .. })
    ));
}

#[test]
fn cancelled_clear_is_never_sent() {
    let sim = SimulatedElm::with_handshake();
    sim.add_response("04", "44");
    let mut session = connected_session(&sim);

    let token = session.cancel_token();
    token.cancel();
    assert!(matches!(session.clear_trouble_codes(), Err(DiagError::Cancelled)));
    assert!(!sim.sent_commands().iter().any(|c| c == "04"));
    assert_eq!(session.state(), ConnectionState::Connected);

    token.reset();
    assert_eq!(session.clear_trouble_codes().unwrap(), "44");
}

#[test]
fn supported_pids_after_protocol_search() {
    let sim = SimulatedElm::with_handshake();
    sim.clear_response("0100");
    sim.add_response("0100", "SEARCHING...\r41 00 BE 1F A8 13");
    let session = connected_session(&sim);

    let pids = session.supported_pids().unwrap();
    assert_eq!(&pids[..6], &[0x01, 0x03, 0x04, 0x05, 0x06, 0x07]);
    assert_eq!(pids.last(), Some(&0x20));
}
