//! Streaming messages over an active session: ordering, replay and reflection

use super::common::{open_session, parties, Party};
use fabstir_e2e_session::config::E2eConfig;
use fabstir_e2e_session::crypto::{CryptoError, ErrorKind};
use fabstir_e2e_session::session::{
    InboundEvent, MemoryChannel, SessionChannel, SessionState, WireMessage,
};
use std::sync::Arc;

async fn next_frame(channel: &MemoryChannel) -> WireMessage {
    channel.receive().await.unwrap().unwrap()
}

fn message(session_id: &str, content: &str, index: u64) -> Option<InboundEvent> {
    Some(InboundEvent::Message {
        session_id: session_id.to_string(),
        content: content.to_string(),
        message_index: Some(index),
    })
}

#[tokio::test]
async fn test_ordered_messages_then_replay_fails_session() {
    let (client, host) = parties();
    let (client_end, host_end) = MemoryChannel::pair();
    let session_id = open_session(&client, &host, &client_end, &host_end).await;

    assert_eq!(
        client.registry.send_message(&client_end, &session_id, "Hello").await.unwrap(),
        0
    );
    assert_eq!(
        client.registry.send_message(&client_end, &session_id, "World").await.unwrap(),
        1
    );

    let hello = next_frame(&host_end).await;
    let world = next_frame(&host_end).await;

    let first = host.registry.handle_inbound(&host_end, hello.clone()).await;
    assert_eq!(first.ok(), message(&session_id, "Hello", 0));
    let second = host.registry.handle_inbound(&host_end, world).await;
    assert_eq!(second.ok(), message(&session_id, "World", 1));

    let err = host
        .registry
        .handle_inbound(&host_end, hello)
        .await
        .unwrap_err();
    assert!(matches!(err, CryptoError::SessionState { .. }));
    assert_eq!(
        host.registry.state(&session_id).await,
        Some(SessionState::Failed)
    );

    let info = host.registry.session_info(&session_id).await.unwrap();
    assert!(info.failure_reason.unwrap().contains("replayed"));

    match next_frame(&client_end).await {
        WireMessage::Error { code, .. } => assert_eq!(code, "SESSION_STATE_ERROR"),
        other => panic!("expected error notice, got {}", other.type_name()),
    }
}

#[tokio::test]
async fn test_responder_replies_with_own_counter() {
    let (client, host) = parties();
    let (client_end, host_end) = MemoryChannel::pair();
    let session_id = open_session(&client, &host, &client_end, &host_end).await;

    client
        .registry
        .send_message(&client_end, &session_id, "What is 2+2?")
        .await
        .unwrap();
    let question = host.registry.receive_message(&host_end).await.unwrap();
    assert_eq!(question, message(&session_id, "What is 2+2?", 0));

    for (i, chunk) in ["The ", "answer ", "is 4"].iter().enumerate() {
        let index = host
            .registry
            .send_message(&host_end, &session_id, chunk)
            .await
            .unwrap();
        assert_eq!(index, i as u64);
    }

    let mut reply = String::new();
    for i in 0..3 {
        match client.registry.receive_message(&client_end).await.unwrap() {
            Some(InboundEvent::Message {
                content,
                message_index,
                ..
            }) => {
                assert_eq!(message_index, Some(i));
                reply.push_str(&content);
            }
            other => panic!("expected message, got {:?}", other),
        }
    }
    assert_eq!(reply, "The answer is 4");

    let info = host.registry.session_info(&session_id).await.unwrap();
    assert_eq!(info.messages_sent, 3);
    assert_eq!(info.messages_received, 1);
}

#[tokio::test]
async fn test_reflected_message_is_rejected() {
    let (client, host) = parties();
    let (client_end, host_end) = MemoryChannel::pair();
    let session_id = open_session(&client, &host, &client_end, &host_end).await;

    client
        .registry
        .send_message(&client_end, &session_id, "mine")
        .await
        .unwrap();
    let own_frame = next_frame(&host_end).await;

    // Bounce the client's own ciphertext back at it
    let err = client
        .registry
        .handle_inbound(&client_end, own_frame)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionState);
    assert!(err.to_string().contains("direction"));
    assert_eq!(
        client.registry.state(&session_id).await,
        Some(SessionState::Failed)
    );
}

#[tokio::test]
async fn test_tampered_message_fails_session() {
    let (client, host) = parties();
    let (client_end, host_end) = MemoryChannel::pair();
    let session_id = open_session(&client, &host, &client_end, &host_end).await;

    client.registry.send_message(&client_end, &session_id, "one").await.unwrap();
    client.registry.send_message(&client_end, &session_id, "two").await.unwrap();
    let mut first = next_frame(&host_end).await;
    let second = next_frame(&host_end).await;

    if let WireMessage::EncryptedMessage { payload, .. } = &mut first {
        payload.ciphertext[0] ^= 0x80;
    }

    let err = host
        .registry
        .handle_inbound(&host_end, first)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert_eq!(
        host.registry.state(&session_id).await,
        Some(SessionState::Failed)
    );

    // Nothing more is accepted once the key is gone
    let err = host
        .registry
        .handle_inbound(&host_end, second)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionState);
}

#[tokio::test]
async fn test_forged_index_fails_authentication() {
    let (client, host) = parties();
    let (client_end, host_end) = MemoryChannel::pair();
    let session_id = open_session(&client, &host, &client_end, &host_end).await;

    client.registry.send_message(&client_end, &session_id, "x").await.unwrap();
    let mut frame = next_frame(&host_end).await;
    if let WireMessage::EncryptedMessage { payload, .. } = &mut frame {
        payload.aad[8] = 9;
    }

    let err = host
        .registry
        .handle_inbound(&host_end, frame)
        .await
        .unwrap_err();
    assert!(matches!(err, CryptoError::DecryptionFailed { .. }));
}

#[tokio::test]
async fn test_relaxed_ordering_accepts_out_of_order() {
    let relaxed = E2eConfig {
        strict_message_ordering: false,
        ..Default::default()
    };
    let client = Party::new(E2eConfig::default());
    let host = Party::new(relaxed);
    let (client_end, host_end) = MemoryChannel::pair();
    let session_id = open_session(&client, &host, &client_end, &host_end).await;

    client.registry.send_message(&client_end, &session_id, "a").await.unwrap();
    client.registry.send_message(&client_end, &session_id, "b").await.unwrap();
    let a = next_frame(&host_end).await;
    let b = next_frame(&host_end).await;

    assert!(host.registry.handle_inbound(&host_end, b).await.is_ok());
    assert!(host.registry.handle_inbound(&host_end, a).await.is_ok());
    assert_eq!(
        host.registry.state(&session_id).await,
        Some(SessionState::Active)
    );
}

#[tokio::test]
async fn test_message_for_unknown_session_is_not_fatal() {
    let (client, host) = parties();
    let (client_end, host_end) = MemoryChannel::pair();
    let session_id = open_session(&client, &host, &client_end, &host_end).await;

    client.registry.send_message(&client_end, &session_id, "x").await.unwrap();
    let frame = match next_frame(&host_end).await {
        WireMessage::EncryptedMessage { payload, .. } => WireMessage::EncryptedMessage {
            session_id: "no-such-session".to_string(),
            payload,
        },
        other => panic!("unexpected {}", other.type_name()),
    };

    let err = host
        .registry
        .handle_inbound(&host_end, frame)
        .await
        .unwrap_err();
    assert!(matches!(err, CryptoError::SessionKeyNotFound { .. }));
    assert_eq!(
        host.registry.state(&session_id).await,
        Some(SessionState::Active)
    );
}

#[tokio::test]
async fn test_concurrent_sends_get_unique_ordered_indices() {
    let (client, host) = parties();
    let (client_end, host_end) = MemoryChannel::pair();
    let session_id = open_session(&client, &host, &client_end, &host_end).await;

    let client = Arc::new(client);
    let client_end = Arc::new(client_end);
    let mut handles = Vec::new();
    for i in 0..20 {
        let client = client.clone();
        let client_end = client_end.clone();
        let session_id = session_id.clone();
        handles.push(tokio::spawn(async move {
            client
                .registry
                .send_message(client_end.as_ref(), &session_id, &format!("chunk {}", i))
                .await
                .unwrap()
        }));
    }

    let mut indices = Vec::new();
    for handle in handles {
        indices.push(handle.await.unwrap());
    }
    indices.sort_unstable();
    assert_eq!(indices, (0..20).collect::<Vec<u64>>());

    // Frames reach the wire in index order, so strict ordering accepts all
    for expected in 0..20u64 {
        match host.registry.receive_message(&host_end).await.unwrap() {
            Some(InboundEvent::Message { message_index, .. }) => {
                assert_eq!(message_index, Some(expected))
            }
            other => panic!("expected message, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_send_after_close_is_rejected() {
    let (client, host) = parties();
    let (client_end, host_end) = MemoryChannel::pair();
    let session_id = open_session(&client, &host, &client_end, &host_end).await;

    client
        .registry
        .close_session(&client_end, &session_id)
        .await
        .unwrap();
    let err = client
        .registry
        .send_message(&client_end, &session_id, "late")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionState);
    // Closed stays closed rather than turning into Failed
    assert_eq!(
        client.registry.state(&session_id).await,
        Some(SessionState::Closed)
    );
}

#[tokio::test]
async fn test_undecodable_envelope_fails_session() {
    let (client, host) = parties();
    let (client_end, host_end) = MemoryChannel::pair();
    let session_id = open_session(&client, &host, &client_end, &host_end).await;

    let frame = serde_json::json!({
        "type": "encrypted_message",
        "session_id": session_id,
        "payload": {
            "nonceHex": "0xZZ",
            "ciphertextHex": "0x00",
            "aadHex": "0x00"
        }
    });
    client_end.send_raw(frame.to_string()).unwrap();

    let err = host.registry.receive_message(&host_end).await.unwrap_err();
    assert!(matches!(err, CryptoError::InvalidPayload { .. }));
    assert!(err.is_fatal_to_session());
    assert_eq!(
        host.registry.state(&session_id).await,
        Some(SessionState::Failed)
    );

    match next_frame(&client_end).await {
        WireMessage::Error { code, .. } => assert_eq!(code, "VALIDATION_ERROR"),
        other => panic!("expected error notice, got {}", other.type_name()),
    }
}

#[tokio::test]
async fn test_unparseable_frame_without_session_is_not_fatal() {
    let (client, host) = parties();
    let (client_end, host_end) = MemoryChannel::pair();
    let session_id = open_session(&client, &host, &client_end, &host_end).await;

    client_end.send_raw("{not json").unwrap();
    let err = host.registry.receive_message(&host_end).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(
        host.registry.state(&session_id).await,
        Some(SessionState::Active)
    );
}
