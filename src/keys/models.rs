use serde::{Deserialize, Serialize};

/// Provisioned access-key record as persisted in the credential database.
/// `internal_id` is allocated by the store and never reused; the owner
/// identity is the requester's durable Telegram identifier.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub internal_id: u64,
    pub owner_identity: i64,
    pub label: String,
    pub cipher_suite: CipherSuite,
    /// Opaque secret returned by the Outline server (an ss:// access URL).
    pub credential_material: String,
}

/// Candidate record before the store has assigned an internal id.
#[derive(Clone, Debug)]
pub struct NewCredential {
    pub owner_identity: i64,
    pub label: String,
    pub cipher_suite: CipherSuite,
    pub credential_material: String,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum CipherSuite {
    #[serde(rename = "aes-128-gcm")]
    Aes128Gcm,
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    #[default]
    #[serde(rename = "chacha20-ietf-poly1305")]
    Chacha20IetfPoly1305,
    #[serde(rename = "xchacha20-ietf-poly1305")]
    XChacha20IetfPoly1305,
}

impl CipherSuite {
    pub const ALL: [CipherSuite; 4] = [
        CipherSuite::Aes128Gcm,
        CipherSuite::Aes256Gcm,
        CipherSuite::Chacha20IetfPoly1305,
        CipherSuite::XChacha20IetfPoly1305,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CipherSuite::Aes128Gcm => "aes-128-gcm",
            CipherSuite::Aes256Gcm => "aes-256-gcm",
            CipherSuite::Chacha20IetfPoly1305 => "chacha20-ietf-poly1305",
            CipherSuite::XChacha20IetfPoly1305 => "xchacha20-ietf-poly1305",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "aes-128-gcm" => Some(CipherSuite::Aes128Gcm),
            "aes-256-gcm" => Some(CipherSuite::Aes256Gcm),
            "chacha20-ietf-poly1305" => Some(CipherSuite::Chacha20IetfPoly1305),
            "xchacha20-ietf-poly1305" => Some(CipherSuite::XChacha20IetfPoly1305),
            _ => None,
        }
    }
}
