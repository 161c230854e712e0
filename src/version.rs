// Version information for the Fabstir E2E session protocol

/// Full version string with feature description
pub const VERSION: &str = "v0.1.0-e2e-sessions-2025-11-04";

/// Semantic version number
pub const VERSION_NUMBER: &str = "0.1.0";

/// Wire protocol version; bump when envelope or AAD layout changes
pub const PROTOCOL_VERSION: u32 = 1;

/// Build date
pub const BUILD_DATE: &str = "2025-11-04";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "end-to-end-encryption",
    "ecdh-key-exchange",
    "hkdf-sha256",
    "xchacha20-poly1305",
    "recoverable-signatures",
    "sender-attribution",
    "encrypted-sessions",
    "encrypted-storage-records",
    "key-discovery-challenge",
    "perfect-forward-secrecy",
    "replay-protection",
    "plaintext-fallback-opt-out",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!(
        "Fabstir E2E Sessions {} (protocol v{}, {})",
        VERSION_NUMBER, PROTOCOL_VERSION, BUILD_DATE
    )
}

/// Get full version info as JSON
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "version": VERSION_NUMBER,
        "build": VERSION,
        "protocol": PROTOCOL_VERSION,
        "date": BUILD_DATE,
        "features": FEATURES,
        "algorithm": crate::crypto::envelope::ALGORITHM_ID,
    })
}
