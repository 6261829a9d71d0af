// Integration tests for inter-context frame size limits

mod helpers;

use helpers::{test_config, ScriptedPicker};
use marker_bridge_lib::error::TransportError;
use marker_bridge_lib::privileged::LocalStorage;
use marker_bridge_lib::protocol::{
    deserialize_message, encode_frame, serialize_message, Action, ActionMessage, ActionResponse,
    SaveFilePayload, MAX_REQUEST_FRAME_SIZE, MAX_RESPONSE_FRAME_SIZE,
};
use marker_bridge_lib::runtime::Bridge;
use marker_bridge_lib::transport::Transport;
use tempfile::TempDir;

fn save_message(content: String) -> ActionMessage {
    ActionMessage::new(Action::SaveFile, SaveFilePayload { content })
}

#[tokio::test]
async fn test_oversized_request_is_refused_before_dispatch() {
    let temp = TempDir::new().unwrap();
    let picker = ScriptedPicker::answering(vec![Some(temp.path().to_path_buf())]);
    let bridge = Bridge::start(
        &test_config(&temp.path().join("state")),
        LocalStorage::new(picker.clone()),
        None,
    );

    let huge = format!("// big.txt\n{}", "x".repeat(MAX_REQUEST_FRAME_SIZE + 1000));
    let err = bridge
        .coordinator_transport()
        .send(save_message(huge))
        .await
        .unwrap_err();

    match err {
        TransportError::FrameTooLarge { size, max } => {
            assert_eq!(max, MAX_REQUEST_FRAME_SIZE);
            assert!(size > MAX_REQUEST_FRAME_SIZE);
        }
        other => panic!("Expected FrameTooLarge, got: {:?}", other),
    }
    // Rejected before any context was brought up or prompted
    assert_eq!(bridge.coordinator().readiness().creation_attempts(), 0);
    assert_eq!(picker.prompts(), 0);
    bridge.shutdown();
}

#[tokio::test]
async fn test_request_just_under_limit_is_processed() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("out");
    std::fs::create_dir(&root).unwrap();
    let bridge = Bridge::start(
        &test_config(&temp.path().join("state")),
        LocalStorage::new(ScriptedPicker::answering(vec![Some(root.clone())])),
        None,
    );

    let body = "y".repeat(MAX_REQUEST_FRAME_SIZE / 2);
    let response = bridge
        .coordinator_transport()
        .send(save_message(format!("// big.txt\n{}", body)))
        .await
        .unwrap();

    assert_eq!(response, ActionResponse::saved("big.txt"));
    assert_eq!(std::fs::read_to_string(root.join("big.txt")).unwrap(), body);
    bridge.shutdown();
}

#[test]
fn test_encode_frame_enforces_limit() {
    let msg = save_message("z".repeat(64));
    let bytes = encode_frame(&msg, MAX_REQUEST_FRAME_SIZE).unwrap();
    assert_eq!(bytes.last(), Some(&b'\n'));

    let err = encode_frame(&msg, 16).unwrap_err();
    match err {
        TransportError::FrameTooLarge { size, max } => {
            assert_eq!(max, 16);
            assert_eq!(size, bytes.len());
        }
        other => panic!("Expected FrameTooLarge, got: {:?}", other),
    }
}

#[test]
fn test_limits_are_ordered() {
    // Responses may carry more than requests (e.g. loaded content)
    assert!(MAX_RESPONSE_FRAME_SIZE > MAX_REQUEST_FRAME_SIZE);
}

#[test]
fn test_frames_are_newline_delimited_json() {
    let response = ActionResponse::directory("projects");
    let bytes = serialize_message(&response).unwrap();

    assert_eq!(bytes.iter().filter(|b| **b == b'\n').count(), 1);
    let parsed: ActionResponse = deserialize_message(&bytes).unwrap();
    assert_eq!(parsed, response);
}
