use crate::*;

#[test]
fn ping_sample_payload_round_trips() {
    let payload = PingSamplePayload::new(10, PingStatus::Ok, Some(50.0));
    let serialized = serde_json::to_string(&payload).unwrap();
    let deserialized: PingSamplePayload = serde_json::from_str(&serialized).unwrap();
    assert_eq!(deserialized.sensor_id, 10);
    assert_eq!(deserialized.status, PingStatus::Ok);
    assert_eq!(deserialized.latency_ms, Some(50.0));
}

#[test]
fn sample_event_untagged_serializes_as_the_inner_payload() {
    let event = SampleEvent::Ethernet(EthernetSamplePayload::new(
        11,
        EthernetStatus::LinkUp,
        "1Gbps".to_string(),
        "1000000".to_string(),
        "500".to_string(),
    ));
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["sensor_type"], "ethernet");
    assert_eq!(value["speed"], "1Gbps");
}

#[test]
fn pending_placeholder_matches_sensor_kind() {
    let ping = SampleEvent::pending(1, SensorKind::Ping);
    match ping {
        SampleEvent::Ping(p) => assert_eq!(p.status, PingStatus::Pending),
        _ => panic!("expected ping payload"),
    }

    let eth = SampleEvent::pending(2, SensorKind::Ethernet);
    match eth {
        SampleEvent::Ethernet(e) => assert_eq!(e.status, EthernetStatus::Pending),
        _ => panic!("expected ethernet payload"),
    }
}

#[test]
fn sensor_config_defaults_interval_by_kind() {
    let json = r#"{"alerts":[]}"#;
    let cfg: SensorConfig = serde_json::from_str(json).unwrap();
    assert_eq!(cfg.interval(SensorKind::Ping).as_secs(), 60);
    assert_eq!(cfg.interval(SensorKind::Ethernet).as_secs(), 30);
}

#[test]
fn alert_config_deserializes_type_tag() {
    let json = r#"{"type":"high_latency","channel_id":7,"cooldown_minutes":5,"threshold_ms":40.0}"#;
    let alert: AlertConfig = serde_json::from_str(json).unwrap();
    assert_eq!(alert.alert_type, AlertType::HighLatency);
    assert_eq!(alert.threshold_ms, Some(40.0));
}

#[test]
fn ws_client_message_variants_parse() {
    let sub: WsClientMessage = serde_json::from_str(
        r#"{"type":"subscribe_sensors","sensor_ids":[1,2,3]}"#,
    )
    .unwrap();
    match sub {
        WsClientMessage::SubscribeSensors { sensor_ids } => {
            assert_eq!(sensor_ids, vec![1, 2, 3])
        }
        _ => panic!("expected subscribe_sensors"),
    }

    let ping: WsClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
    assert!(matches!(ping, WsClientMessage::Ping));
}
