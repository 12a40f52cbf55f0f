use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Default location of the Outline provisioning descriptor written by the
/// server installer: line 1 is the 64-hex-char certificate SHA-256
/// fingerprint, line 2 the management API base URL.
const DEFAULT_ACCESS_CONFIG: &str = "/opt/outline/access.txt";

/// Static configuration assembled once at startup and threaded into every
/// component constructor. Nothing is re-read from the environment afterwards.
#[derive(Clone, Debug)]
pub struct Config {
    pub bot_token: String,
    pub admin_id: i64,
    pub database_path: PathBuf,
    pub outline_api_url: String,
    /// SHA-256 fingerprint of the Outline server certificate, lowercase hex.
    /// `None` disables pinning (plain-HTTP test setups).
    pub outline_cert_sha256: Option<String>,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let bot_token = read_optional_env("BOT_TOKEN")
            .ok_or_else(|| AppError::Config("BOT_TOKEN must be set".into()))?;
        let admin_id = read_optional_env("ADMIN_ID")
            .ok_or_else(|| AppError::Config("ADMIN_ID must be set".into()))?
            .parse::<i64>()
            .map_err(|err| AppError::Config(format!("ADMIN_ID must be an integer: {err}")))?;

        let database_path = read_optional_env("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("database.json"));

        let (outline_api_url, outline_cert_sha256) = match read_optional_env("OUTLINE_API_URL") {
            Some(url) => {
                let fingerprint = read_optional_env("OUTLINE_CERT_SHA256")
                    .map(|raw| validate_fingerprint(&raw))
                    .transpose()?;
                (url, fingerprint)
            }
            None => {
                let path = read_optional_env("OUTLINE_ACCESS_CONFIG")
                    .unwrap_or_else(|| DEFAULT_ACCESS_CONFIG.to_string());
                let raw = std::fs::read_to_string(&path).map_err(|err| {
                    AppError::Config(format!("failed to read access descriptor {path}: {err}"))
                })?;
                let (fingerprint, url) = parse_access_descriptor(&raw)?;
                (url, Some(fingerprint))
            }
        };

        let request_timeout = read_optional_env("OUTLINE_TIMEOUT_SECS")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(10));

        Ok(Self {
            bot_token,
            admin_id,
            database_path,
            outline_api_url: outline_api_url.trim_end_matches('/').to_string(),
            outline_cert_sha256,
            request_timeout,
        })
    }
}

/// Parses the two-line provisioning descriptor: certificate fingerprint
/// first, API base URL second. Blank lines are skipped.
pub fn parse_access_descriptor(raw: &str) -> AppResult<(String, String)> {
    let mut lines = raw.lines().map(str::trim).filter(|line| !line.is_empty());
    let fingerprint = lines
        .next()
        .ok_or_else(|| AppError::Config("access descriptor is empty".into()))?;
    let url = lines
        .next()
        .ok_or_else(|| AppError::Config("access descriptor is missing the API URL line".into()))?;
    Ok((
        validate_fingerprint(fingerprint)?,
        url.trim_end_matches('/').to_string(),
    ))
}

fn validate_fingerprint(raw: &str) -> AppResult<String> {
    let normalized = raw.trim().to_ascii_lowercase();
    if normalized.len() != 64 || !normalized.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AppError::Config(
            "certificate fingerprint must be 64 hex characters".into(),
        ));
    }
    Ok(normalized)
}

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FINGERPRINT: &str = "ab12cd34ef56ab12cd34ef56ab12cd34ef56ab12cd34ef56ab12cd34ef56ab12";

    #[test]
    fn descriptor_parses_fingerprint_then_url() {
        let raw = format!("{FINGERPRINT}\nhttps://198.51.100.7:9981/secret\n");
        let (fingerprint, url) = parse_access_descriptor(&raw).unwrap();
        assert_eq!(fingerprint, FINGERPRINT);
        assert_eq!(url, "https://198.51.100.7:9981/secret");
    }

    #[test]
    fn descriptor_skips_blank_lines_and_normalizes_case() {
        let raw = format!("\n  {}  \n\nhttps://host:443/api/\n", FINGERPRINT.to_uppercase());
        let (fingerprint, url) = parse_access_descriptor(&raw).unwrap();
        assert_eq!(fingerprint, FINGERPRINT);
        assert_eq!(url, "https://host:443/api");
    }

    #[test]
    fn short_fingerprint_is_rejected() {
        let raw = "abc123\nhttps://host/api\n";
        assert!(parse_access_descriptor(raw).is_err());
    }

    #[test]
    fn missing_url_line_is_rejected() {
        let raw = format!("{FINGERPRINT}\n");
        assert!(parse_access_descriptor(&raw).is_err());
    }
}
