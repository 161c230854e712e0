//! ECDH key agreement and HKDF derivation

use fabstir_e2e_session::crypto::{derive_key, derive_shared_secret, CryptoError};
use k256::{elliptic_curve::sec1::ToEncodedPoint, SecretKey};
use rand::rngs::OsRng;

fn keypair() -> ([u8; 32], Vec<u8>, Vec<u8>) {
    let secret = SecretKey::random(&mut OsRng);
    let public = secret.public_key();
    let compressed = public.to_encoded_point(true).as_bytes().to_vec();
    let uncompressed = public.to_encoded_point(false).as_bytes().to_vec();
    let mut private = [0u8; 32];
    private.copy_from_slice(&secret.to_bytes());
    (private, compressed, uncompressed)
}

#[test]
fn test_shared_secret_is_symmetric() {
    let (a_priv, a_pub, _) = keypair();
    let (b_priv, b_pub, _) = keypair();

    let ab = derive_shared_secret(&a_priv, &b_pub).unwrap();
    let ba = derive_shared_secret(&b_priv, &a_pub).unwrap();
    assert_eq!(*ab, *ba);
}

#[test]
fn test_compressed_and_uncompressed_keys_agree() {
    let (a_priv, _, _) = keypair();
    let (_, b_compressed, b_uncompressed) = keypair();

    let from_compressed = derive_shared_secret(&a_priv, &b_compressed).unwrap();
    let from_uncompressed = derive_shared_secret(&a_priv, &b_uncompressed).unwrap();
    assert_eq!(*from_compressed, *from_uncompressed);
}

#[test]
fn test_invalid_public_key_rejected() {
    let (a_priv, _, _) = keypair();

    let mut bogus = vec![0x02];
    bogus.extend_from_slice(&[0xff; 32]);
    let result = derive_shared_secret(&a_priv, &bogus);
    assert!(matches!(result, Err(CryptoError::InvalidKey { .. })));

    let result = derive_shared_secret(&a_priv, &[0x02; 20]);
    assert!(matches!(result, Err(CryptoError::InvalidKey { .. })));
}

#[test]
fn test_zero_private_key_rejected() {
    let (_, b_pub, _) = keypair();
    assert!(derive_shared_secret(&[0u8; 32], &b_pub).is_err());
}

#[test]
fn test_hkdf_is_deterministic_and_domain_separated() {
    let secret = [7u8; 32];
    let salt = [1u8; 16];

    let k1 = derive_key(&secret, &salt, b"fabstir-e2e-session-v1").unwrap();
    let k2 = derive_key(&secret, &salt, b"fabstir-e2e-session-v1").unwrap();
    let k3 = derive_key(&secret, &salt, b"fabstir-e2e-storage-v1").unwrap();
    let k4 = derive_key(&secret, &[2u8; 16], b"fabstir-e2e-session-v1").unwrap();

    assert_eq!(*k1, *k2);
    assert_ne!(*k1, *k3, "info must separate derived keys");
    assert_ne!(*k1, *k4, "salt must separate derived keys");
}

#[test]
fn test_hkdf_rejects_short_secret() {
    let result = derive_key(&[0u8; 16], b"", b"info");
    assert!(matches!(result, Err(CryptoError::KeyDerivationFailed { .. })));
}
