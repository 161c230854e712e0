//! Signed envelope protocol: seal-with-signature / open-with-recovery

use fabstir_e2e_session::crypto::envelope::{ALGORITHM_ID, SESSION_INFO, STORAGE_INFO};
use fabstir_e2e_session::crypto::{
    address_of, open_with_recovery, recover_sender_address, seal_with_signature, CryptoError,
    Envelope, ErrorKind, OpenOptions, SealOptions, UserOutcome,
};
use k256::{elliptic_curve::sec1::ToEncodedPoint, SecretKey};
use rand::{rngs::OsRng, RngCore};

struct Party {
    private: [u8; 32],
    public: Vec<u8>,
}

impl Party {
    fn new() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let mut private = [0u8; 32];
        private.copy_from_slice(&secret.to_bytes());
        Self {
            private,
            public: secret.public_key().to_encoded_point(true).as_bytes().to_vec(),
        }
    }

    fn address(&self) -> String {
        address_of(&self.public).unwrap()
    }
}

fn seal(to: &Party, from: &Party, plaintext: &[u8]) -> Envelope {
    seal_with_signature(&to.public, &from.private, plaintext, SealOptions::default()).unwrap()
}

fn open(by: &Party, envelope: &Envelope) -> Result<(Vec<u8>, String), CryptoError> {
    let opened = open_with_recovery(&by.private, &by.public, envelope, OpenOptions::default())?;
    Ok((opened.plaintext.to_vec(), opened.sender_address))
}

#[test]
fn test_roundtrip_attributes_sender() {
    let alice = Party::new();
    let bob = Party::new();

    for len in [0usize, 1, 31, 32, 33, 1024, 64 * 1024] {
        let mut plaintext = vec![0u8; len];
        OsRng.fill_bytes(&mut plaintext);

        let envelope = seal(&bob, &alice, &plaintext);
        let (opened, sender) = open(&bob, &envelope).unwrap();
        assert_eq!(opened, plaintext, "length {}", len);
        assert_eq!(sender, alice.address());
    }
}

#[test]
fn test_session_init_scenario() {
    let alice = Party::new();
    let bob = Party::new();

    let mut session_key = [0u8; 32];
    OsRng.fill_bytes(&mut session_key);
    let payload = serde_json::json!({
        "sessionKey": format!("0x{}", hex::encode(session_key)),
        "label": "llama-3",
        "jobId": 123,
    });
    let bytes = serde_json::to_vec(&payload).unwrap();

    let envelope = seal(&bob, &alice, &bytes);
    let (opened, sender) = open(&bob, &envelope).unwrap();

    let decoded: serde_json::Value = serde_json::from_slice(&opened).unwrap();
    assert_eq!(decoded, payload);
    assert_eq!(sender, alice.address());
}

#[test]
fn test_probabilistic_encryption() {
    let alice = Party::new();
    let bob = Party::new();

    let first = seal(&bob, &alice, b"same plaintext");
    let second = seal(&bob, &alice, b"same plaintext");

    assert_ne!(first.ephemeral_public_key, second.ephemeral_public_key);
    assert_ne!(first.nonce, second.nonce);
    assert_ne!(first.salt, second.salt);
    assert_ne!(first.ciphertext, second.ciphertext);
}

#[test]
fn test_no_ephemeral_reuse_across_payloads() {
    let alice = Party::new();
    let bob = Party::new();

    let ephemerals: Vec<Vec<u8>> = (0..16)
        .map(|i| seal(&bob, &alice, format!("payload {}", i).as_bytes()).ephemeral_public_key)
        .collect();

    for (i, a) in ephemerals.iter().enumerate() {
        for b in &ephemerals[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

#[test]
fn test_tamper_rejection_grid() {
    let alice = Party::new();
    let bob = Party::new();
    let envelope = seal(&bob, &alice, b"tamper-evident payload");

    type Field = fn(&mut Envelope) -> &mut Vec<u8>;
    let fields: [(&str, Field); 5] = [
        ("ciphertext", |e| &mut e.ciphertext),
        ("signature", |e| &mut e.signature),
        ("ephemeral_public_key", |e| &mut e.ephemeral_public_key),
        ("salt", |e| &mut e.salt),
        ("nonce", |e| &mut e.nonce),
    ];

    for (name, field) in fields {
        let len = field(&mut envelope.clone()).len();
        for i in 0..len {
            let mut tampered = envelope.clone();
            field(&mut tampered)[i] ^= 0x01;
            let result = open(&bob, &tampered);
            assert!(result.is_err(), "flipping {}[{}] must be rejected", name, i);
        }
    }
}

#[test]
fn test_corrupted_recovery_id_is_signature_error() {
    let alice = Party::new();
    let bob = Party::new();
    let envelope = seal(&bob, &alice, b"attributed payload");

    for flip in [1u8, 2, 3] {
        let mut tampered = envelope.clone();
        tampered.recovery_id ^= flip;
        if tampered.recovery_id > 3 {
            continue;
        }

        let err = open(&bob, &tampered).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Signature, "recovery id {}", tampered.recovery_id);
        assert_eq!(err.outcome(), UserOutcome::SenderUnverified);
    }
}

#[test]
fn test_aad_binding() {
    let alice = Party::new();
    let bob = Party::new();
    let envelope = seal_with_signature(
        &bob.public,
        &alice.private,
        b"bound",
        SealOptions {
            aad: Some(b"job:42".to_vec()),
            ..Default::default()
        },
    )
    .unwrap();

    assert!(open(&bob, &envelope).is_ok());

    let result = open_with_recovery(
        &bob.private,
        &bob.public,
        &envelope,
        OpenOptions {
            aad: Some(b"job:43".to_vec()),
            ..Default::default()
        },
    );
    assert!(result.is_err());

    let mut stripped = envelope.clone();
    stripped.aad = None;
    assert!(open(&bob, &stripped).is_err());
}

#[test]
fn test_context_info_must_match() {
    let alice = Party::new();
    let bob = Party::new();
    let envelope = seal(&bob, &alice, b"session data");
    assert_eq!(envelope.context_info, SESSION_INFO);

    let result = open_with_recovery(
        &bob.private,
        &bob.public,
        &envelope,
        OpenOptions {
            info: Some(STORAGE_INFO.to_string()),
            ..Default::default()
        },
    );
    assert!(matches!(result, Err(CryptoError::InvalidPayload { .. })));

    let mut relabelled = envelope.clone();
    relabelled.context_info = STORAGE_INFO.to_string();
    assert!(open(&bob, &relabelled).is_err());
}

#[test]
fn test_only_recipient_can_open() {
    let alice = Party::new();
    let bob = Party::new();
    let carol = Party::new();
    let envelope = seal(&bob, &alice, b"for bob");

    assert!(open(&carol, &envelope).is_err());

    let result = open_with_recovery(&carol.private, &bob.public, &envelope, OpenOptions::default());
    assert!(matches!(result, Err(CryptoError::InvalidKey { .. })));
}

#[test]
fn test_validate_rejects_bad_lengths_and_algorithm() {
    let alice = Party::new();
    let bob = Party::new();
    let envelope = seal(&bob, &alice, b"x");
    assert_eq!(envelope.algorithm_id, ALGORITHM_ID);

    let mut short_nonce = envelope.clone();
    short_nonce.nonce.truncate(12);
    assert!(matches!(
        short_nonce.validate(),
        Err(CryptoError::InvalidNonce { .. })
    ));

    let mut long_salt = envelope.clone();
    long_salt.salt.push(0);
    assert_eq!(long_salt.validate().unwrap_err().kind(), ErrorKind::Validation);

    let mut bad_recovery = envelope.clone();
    bad_recovery.recovery_id = 4;
    assert!(bad_recovery.validate().is_err());

    let mut unknown_suite = envelope.clone();
    unknown_suite.algorithm_id = "p256-ecdh+aes-gcm".to_string();
    assert!(open(&bob, &unknown_suite).is_err());
}

#[test]
fn test_recover_sender_without_decrypting() {
    let alice = Party::new();
    let bob = Party::new();
    let envelope = seal(&bob, &alice, b"attributed");

    let sender = recover_sender_address(&envelope, &bob.public).unwrap();
    assert_eq!(sender, alice.address());
}

#[test]
fn test_recovered_address_must_be_compared_to_expected() {
    let alice = Party::new();
    let bob = Party::new();
    let mut tampered = seal(&bob, &alice, b"attributed");
    tampered.recovery_id ^= 1;

    // Recovery alone yields some signer; it is not Alice
    match recover_sender_address(&tampered, &bob.public) {
        Ok(address) => assert_ne!(address, alice.address()),
        Err(err) => assert_eq!(err.kind(), ErrorKind::Signature),
    }

    // Opening cross-checks the sealed sender and refuses the envelope
    let err = open(&bob, &tampered).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Signature);
}

#[test]
fn test_wire_form_is_camel_case_hex() {
    let alice = Party::new();
    let bob = Party::new();
    let envelope = seal(&bob, &alice, b"wire");

    let json = serde_json::to_value(&envelope).unwrap();
    assert!(json["ephemeralPublicKey"].as_str().unwrap().starts_with("0x"));
    assert_eq!(json["ephemeralPublicKey"].as_str().unwrap().len(), 2 + 66);
    assert_eq!(json["salt"].as_str().unwrap().len(), 2 + 32);
    assert_eq!(json["nonce"].as_str().unwrap().len(), 2 + 48);
    assert_eq!(json["signature"].as_str().unwrap().len(), 2 + 128);
    assert!(json["recoveryId"].as_u64().unwrap() <= 3);
    assert_eq!(json["algorithm"], ALGORITHM_ID);
    assert_eq!(json["info"], SESSION_INFO);
    assert!(json.get("aad").is_none());

    let parsed: Envelope = serde_json::from_value(json).unwrap();
    let (opened, _) = open(&bob, &parsed).unwrap();
    assert_eq!(opened, b"wire");
}
