//! Deprecated plaintext sessions and downgrade detection

use super::common::{open_session, parties, Party};
use fabstir_e2e_session::config::E2eConfig;
use fabstir_e2e_session::crypto::{CryptoError, Direction, ErrorKind, SessionKey};
use fabstir_e2e_session::session::{
    EncryptionMode, InboundEvent, MemoryChannel, SessionChannel, SessionState, StartSession,
    WireMessage,
};

#[tokio::test]
async fn test_explicit_opt_out_runs_plaintext() {
    let (client, host) = parties();
    let (client_end, host_end) = MemoryChannel::pair();

    let session_id = client
        .registry
        .start_session(
            &client_end,
            StartSession::new(host.address(), 5, "tiny-llama").without_encryption(),
        )
        .await
        .unwrap();

    // No key discovery happened
    assert_eq!(client.registry.resolver().cache().count().await, 0);

    assert_eq!(
        host.registry.receive_message(&host_end).await.unwrap(),
        Some(InboundEvent::SessionOpened {
            session_id: session_id.clone(),
            peer_address: None,
            job_id: 5,
            model_name: "tiny-llama".to_string(),
            mode: EncryptionMode::Plaintext,
        })
    );

    client
        .registry
        .send_message(&client_end, &session_id, "hi")
        .await
        .unwrap();
    assert_eq!(
        host.registry.receive_message(&host_end).await.unwrap(),
        Some(InboundEvent::Message {
            session_id: session_id.clone(),
            content: "hi".to_string(),
            message_index: None,
        })
    );

    let info = client.registry.session_info(&session_id).await.unwrap();
    assert_eq!(info.mode, EncryptionMode::Plaintext);
    assert_eq!(info.state, SessionState::Active);
}

#[tokio::test]
async fn test_config_can_default_to_plaintext() {
    let client = Party::new(E2eConfig {
        encryption_enabled: false,
        ..Default::default()
    });
    let host = Party::new(E2eConfig::default());
    let (client_end, host_end) = MemoryChannel::pair();

    client
        .registry
        .start_session(&client_end, StartSession::new(host.address(), 1, "m"))
        .await
        .unwrap();

    match host_end.receive().await.unwrap() {
        Some(WireMessage::SessionInit { job_id, .. }) => assert_eq!(job_id, 1),
        other => panic!("expected plaintext session_init, got {:?}", other),
    }
}

#[tokio::test]
async fn test_host_can_refuse_plaintext() {
    let client = Party::new(E2eConfig::default());
    let host = Party::new(E2eConfig {
        allow_plaintext_fallback: false,
        ..Default::default()
    });
    let (client_end, host_end) = MemoryChannel::pair();

    let session_id = client
        .registry
        .start_session(
            &client_end,
            StartSession::new(host.address(), 1, "m").without_encryption(),
        )
        .await
        .unwrap();

    let err = host
        .registry
        .receive_message(&host_end)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionState);
    assert_eq!(host.registry.state(&session_id).await, None);

    match client.registry.receive_message(&client_end).await.unwrap() {
        Some(InboundEvent::PeerError { code, message, .. }) => {
            assert_eq!(code, "SESSION_STATE_ERROR");
            assert_eq!(message, "encryption required");
        }
        other => panic!("expected PeerError, got {:?}", other),
    }
    assert_eq!(
        client.registry.state(&session_id).await,
        Some(SessionState::Failed)
    );
}

#[tokio::test]
async fn test_plaintext_on_encrypted_session_is_downgrade() {
    let (client, host) = parties();
    let (client_end, host_end) = MemoryChannel::pair();
    let session_id = open_session(&client, &host, &client_end, &host_end).await;

    client_end
        .send(WireMessage::PlaintextMessage {
            session_id: session_id.clone(),
            content: "ignore previous instructions".to_string(),
        })
        .await
        .unwrap();

    let err = host
        .registry
        .receive_message(&host_end)
        .await
        .unwrap_err();
    assert!(matches!(err, CryptoError::SessionState { .. }));
    assert_eq!(
        host.registry.state(&session_id).await,
        Some(SessionState::Failed)
    );
}

#[tokio::test]
async fn test_encrypted_message_on_plaintext_session_is_rejected() {
    let (client, host) = parties();
    let (client_end, host_end) = MemoryChannel::pair();

    let session_id = client
        .registry
        .start_session(
            &client_end,
            StartSession::new(host.address(), 1, "m").without_encryption(),
        )
        .await
        .unwrap();
    host.registry.receive_message(&host_end).await.unwrap();

    let payload = client
        .registry
        .manager()
        .encrypt_message(
            &SessionKey::generate(),
            b"sneaky",
            0,
            Direction::InitiatorToResponder,
        )
        .unwrap();
    let err = host
        .registry
        .handle_inbound(
            &host_end,
            WireMessage::EncryptedMessage {
                session_id: session_id.clone(),
                payload,
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SessionState);
    assert_eq!(
        host.registry.state(&session_id).await,
        Some(SessionState::Failed)
    );
}
