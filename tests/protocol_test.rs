//! Wire-shape tests for the client/server protocol.

use phenosynth_render::ws::protocol::{
    decode_message, encode_message, ClientMessage, ProtocolError, ServerMessage,
};

#[test]
fn render_request_accepts_full_field_set() {
    let text = r#"{
        "type": "render",
        "requestId": "req-42",
        "genome": {"nodes": [{"kind": "osc"}]},
        "duration": 3.5,
        "noteDelta": -12,
        "velocity": 0.5,
        "useGPU": true,
        "batch": false,
        "sampleRate": 44100
    }"#;
    let ClientMessage::Render(req) = decode_message(text, 4096).unwrap() else {
        panic!("expected render");
    };
    assert_eq!(req.request_id.as_deref(), Some("req-42"));
    assert!(req.genome_id.is_none());
    assert!(req.genome.is_some());
    assert_eq!(req.duration, 3.5);
    assert_eq!(req.note_delta, -12.0);
    assert_eq!(req.velocity, 0.5);
    assert!(req.use_gpu);
    assert_eq!(req.sample_rate, Some(44_100));
    assert!(req.validate().is_ok());
}

#[test]
fn every_server_message_carries_its_tag() {
    let cases = vec![
        (ServerMessage::Welcome { sample_rate: 48_000 }, "welcome"),
        (
            ServerMessage::Chunk {
                request_id: None,
                index: 1,
                data: vec![0.0],
                timestamp: 0.25,
                sample_rate: 48_000,
            },
            "chunk",
        ),
        (
            ServerMessage::BatchResult {
                request_id: Some("r".into()),
                total_samples: 10,
                duration: 0.1,
                sample_rate: 48_000,
            },
            "batch-result",
        ),
        (
            ServerMessage::Complete {
                request_id: Some("r".into()),
                total_chunks: 2,
                total_samples: 10,
                duration: 0.1,
                sample_rate: 48_000,
            },
            "complete",
        ),
        (ServerMessage::error(None, "boom"), "error"),
    ];
    for (message, tag) in cases {
        let json: serde_json::Value =
            serde_json::from_str(&encode_message(&message).unwrap()).unwrap();
        assert_eq!(json["type"], tag);
    }
}

#[test]
fn field_names_are_camel_case_on_the_wire() {
    let json = encode_message(&ServerMessage::Complete {
        request_id: Some("abc".into()),
        total_chunks: 4,
        total_samples: 1000,
        duration: 0.125,
        sample_rate: 8_000,
    })
    .unwrap();
    assert!(json.contains(r#""requestId":"abc""#));
    assert!(json.contains(r#""totalChunks":4"#));
    assert!(json.contains(r#""totalSamples":1000"#));
    assert!(json.contains(r#""sampleRate":8000"#));
}

#[test]
fn malformed_json_is_invalid_format() {
    let err = decode_message("{definitely not json", 4096).unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidFormat(_)));
}

#[test]
fn oversized_frame_is_rejected_by_length() {
    let payload = format!(r#"{{"type":"render","duration":1.0,"pad":"{}"}}"#, "y".repeat(2048));
    let err = decode_message(&payload, 128).unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::MessageTooLarge { max: 128, .. }
    ));
}

#[test]
fn round_trips_a_playback_position() {
    let msg = decode_message(r#"{"type":"playback-position","position":12.25}"#, 1024).unwrap();
    let ClientMessage::PlaybackPosition { position } = msg else {
        panic!("expected playback-position");
    };
    assert_eq!(position, 12.25);
}
