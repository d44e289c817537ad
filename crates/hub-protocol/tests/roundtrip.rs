//! Encode-then-decode round-trips for every envelope kind (§8).

use hub_protocol::{AckEnvelope, CommandEnvelope, DeviceMetaEnvelope, DeviceStatusEnvelope, ModuleStatusEnvelope};

#[test]
fn command_envelope_round_trips() {
    let env = CommandEnvelope {
        req_id: "r1".into(),
        actor: "api".into(),
        ts: "2026-07-28T12:00:00Z".into(),
        action: "start".into(),
        params: serde_json::json!({"speed": 3}),
    };
    let json = serde_json::to_string(&env).unwrap();
    let back: CommandEnvelope = serde_json::from_str(&json).unwrap();
    assert_eq!(env, back);
}

#[test]
fn ack_envelope_round_trips() {
    let env = AckEnvelope {
        req_id: "r1".into(),
        success: true,
        action: "start".into(),
        actor: "host:rig-1".into(),
        code: "OK".into(),
        error: None,
        details: serde_json::json!({"k": "v"}),
        ts: "2026-07-28T12:00:01Z".into(),
    };
    let json = serde_json::to_string(&env).unwrap();
    let back: AckEnvelope = serde_json::from_str(&json).unwrap();
    assert_eq!(env, back);
}

#[test]
fn device_meta_envelope_round_trips() {
    let env = DeviceMetaEnvelope {
        device_id: "rig-1".into(),
        modules: vec!["ndi".into(), "projector".into()],
        capabilities: serde_json::json!({"ndi": {"viewer": true}}),
        labels: vec!["lab-a".into()],
        version: "1.2.0".into(),
        metadata: serde_json::json!({}),
        ts: "2026-07-28T12:00:00Z".into(),
    };
    let json = serde_json::to_string(&env).unwrap();
    let back: DeviceMetaEnvelope = serde_json::from_str(&json).unwrap();
    assert_eq!(env, back);
}

#[test]
fn device_status_envelope_round_trips() {
    let env = DeviceStatusEnvelope {
        device_id: "rig-1".into(),
        online: true,
        ts: "2026-07-28T12:00:00Z".into(),
        uptime_seconds: Some(3600),
        memory_bytes: None,
    };
    let json = serde_json::to_string(&env).unwrap();
    let back: DeviceStatusEnvelope = serde_json::from_str(&json).unwrap();
    assert_eq!(env, back);
}

#[test]
fn module_status_envelope_round_trips_ignoring_topic_derived_fields() {
    let env = ModuleStatusEnvelope {
        device_id: "rig-1".into(),
        module: "ndi".into(),
        state: "streaming".into(),
        online: true,
        fields: serde_json::json!({"fps": 60}),
        ts: "2026-07-28T12:00:00Z".into(),
    };
    let json = serde_json::to_string(&env).unwrap();
    let mut back: ModuleStatusEnvelope = serde_json::from_str(&json).unwrap();
    // device_id/module are #[serde(skip)] — topic-derived, not body fields.
    back.device_id = env.device_id.clone();
    back.module = env.module.clone();
    assert_eq!(env, back);
}
