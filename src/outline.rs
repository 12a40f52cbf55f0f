use std::sync::Arc;
use std::time::SystemTime;

use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ServerName};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::keys::models::CipherSuite;

/// Client for the Outline management API. One outbound call per completed
/// provisioning flow: exchange a (label, cipher) pair for an access URL.
pub struct OutlineClient {
    base: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct AccessKeyResponse {
    #[serde(rename = "accessUrl")]
    access_url: String,
}

impl OutlineClient {
    pub fn new(config: &Config) -> AppResult<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.request_timeout);
        if let Some(fingerprint) = &config.outline_cert_sha256 {
            // The management server presents a self-signed certificate; pin
            // its SHA-256 fingerprint instead of disabling verification.
            builder = builder.use_preconfigured_tls(pinned_tls_config(fingerprint)?);
        }
        Ok(Self {
            base: config.outline_api_url.trim_end_matches('/').to_string(),
            client: builder.build()?,
        })
    }

    /// `POST {base}/access-keys` with the requested name and cipher. Any
    /// connection failure, timeout, non-2xx status, or missing `accessUrl`
    /// surfaces as a remote error; callers show a generic message and log
    /// the detail.
    pub async fn create_access_key(&self, label: &str, cipher: CipherSuite) -> AppResult<String> {
        let url = format!("{}/access-keys", self.base);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "name": label, "method": cipher.as_str() }))
            .send()
            .await?
            .error_for_status()?;
        let body: AccessKeyResponse = response
            .json()
            .await
            .map_err(|_| AppError::RemoteShape("access-keys response missing accessUrl"))?;
        Ok(body.access_url)
    }
}

struct PinnedCertVerifier {
    fingerprint: [u8; 32],
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let digest = Sha256::digest(&end_entity.0);
        if digest.as_slice() == self.fingerprint {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::General(format!(
                "server certificate fingerprint mismatch (presented {})",
                hex::encode(digest)
            )))
        }
    }
}

fn pinned_tls_config(fingerprint_hex: &str) -> AppResult<rustls::ClientConfig> {
    let bytes = hex::decode(fingerprint_hex)
        .map_err(|err| AppError::Config(format!("invalid certificate fingerprint: {err}")))?;
    let fingerprint: [u8; 32] = bytes
        .try_into()
        .map_err(|_| AppError::Config("certificate fingerprint must be 32 bytes".into()))?;
    Ok(rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(PinnedCertVerifier { fingerprint }))
        .with_no_client_auth())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_fingerprint_is_accepted() {
        let cert = Certificate(b"fake der bytes".to_vec());
        let verifier = PinnedCertVerifier {
            fingerprint: Sha256::digest(&cert.0).into(),
        };
        let name = ServerName::try_from("vpn.example.org").unwrap();
        assert!(verifier
            .verify_server_cert(&cert, &[], &name, &mut std::iter::empty::<&[u8]>(), &[], SystemTime::now())
            .is_ok());
    }

    #[test]
    fn mismatched_fingerprint_is_rejected() {
        let cert = Certificate(b"fake der bytes".to_vec());
        let verifier = PinnedCertVerifier {
            fingerprint: [0u8; 32],
        };
        let name = ServerName::try_from("vpn.example.org").unwrap();
        let err = verifier
            .verify_server_cert(&cert, &[], &name, &mut std::iter::empty::<&[u8]>(), &[], SystemTime::now())
            .unwrap_err();
        assert!(err.to_string().contains("fingerprint mismatch"));
    }

    #[test]
    fn fingerprint_must_decode_to_32_bytes() {
        assert!(pinned_tls_config("abcd").is_err());
        assert!(pinned_tls_config("zz").is_err());
        let valid = "00".repeat(32);
        assert!(pinned_tls_config(&valid).is_ok());
    }
}
