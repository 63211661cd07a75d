//! # Configuration Management
//!
//! Centralized configuration for an ADB session.
//!
//! Protocol constants live here alongside [`SessionConfig`], the per-session
//! knobs a caller hands to [`crate::session::Session::connect`] once at
//! construction. The key-file location is an explicit configuration value —
//! there is no process-wide key path.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`

use crate::error::{AdbError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Protocol version this engine declares in its CNXN packet.
pub const ADB_VERSION: u32 = 0x0100_0000;

/// Hard upper bound on a single packet's payload, and the decode cap used
/// before max_payload negotiation completes.
pub const MAX_PAYLOAD: usize = 1024 * 1024;

/// Payload bound advertised in the initial CNXN, and the negotiated value
/// assumed when a peer advertises zero. Matches the version-1 protocol.
pub const MAX_PAYLOAD_V1: usize = 4 * 1024;

/// Size of the AUTH challenge token a peer sends.
pub const TOKEN_SIZE: usize = 20;

/// Identity banner sent in the CNXN payload.
pub const DEFAULT_BANNER: &str = "host::";

/// Per-session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Identity string sent as the CNXN payload (NUL-terminated on the wire).
    pub banner: String,

    /// Location of the RSA key pair for the file-backed key provider.
    /// The engine itself never touches the file; the path is plumbed to the
    /// `KeyProvider` implementation the caller constructs.
    pub key_path: Option<PathBuf>,

    /// Payload bound advertised to the peer in CNXN.
    pub max_payload: usize,

    /// Upper bound on the whole connect-and-authenticate exchange.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            banner: DEFAULT_BANNER.to_string(),
            key_path: None,
            max_payload: MAX_PAYLOAD_V1,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AdbError::ConfigError(format!("Failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| AdbError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(banner) = std::env::var("ADB_PROTOCOL_BANNER") {
            config.banner = banner;
        }

        if let Ok(path) = std::env::var("ADB_PROTOCOL_KEY_PATH") {
            config.key_path = Some(PathBuf::from(path));
        }

        if let Ok(max) = std::env::var("ADB_PROTOCOL_MAX_PAYLOAD") {
            if let Ok(val) = max.parse::<usize>() {
                config.max_payload = val;
            }
        }

        if let Ok(timeout) = std::env::var("ADB_PROTOCOL_CONNECT_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.connect_timeout = Duration::from_millis(val);
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Validate the configuration for common misconfigurations.
    ///
    /// Returns a list of validation errors. Empty list means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.banner.is_empty() {
            errors.push("banner must not be empty".to_string());
        }
        if self.banner.as_bytes().contains(&0) {
            errors.push("banner must not contain NUL bytes".to_string());
        }
        if self.max_payload == 0 {
            errors.push("max_payload must be non-zero".to_string());
        }
        if self.max_payload > MAX_PAYLOAD {
            errors.push(format!(
                "max_payload {} exceeds protocol maximum {MAX_PAYLOAD}",
                self.max_payload
            ));
        }
        if self.connect_timeout.is_zero() {
            errors.push("connect_timeout must be non-zero".to_string());
        }

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AdbError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Serde support for serializing Duration as milliseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SessionConfig::default().validate().is_empty());
    }

    #[test]
    fn rejects_zero_max_payload() {
        let config = SessionConfig::default_with_overrides(|c| c.max_payload = 0);
        assert!(!config.validate().is_empty());
        assert!(config.validate_strict().is_err());
    }

    #[test]
    fn rejects_oversized_max_payload() {
        let config = SessionConfig::default_with_overrides(|c| c.max_payload = MAX_PAYLOAD + 1);
        assert!(config.validate_strict().is_err());
    }

    #[test]
    fn rejects_nul_in_banner() {
        let config = SessionConfig::default_with_overrides(|c| c.banner = "host\0:".into());
        assert!(config.validate_strict().is_err());
    }

    #[test]
    fn toml_roundtrip() {
        let config = SessionConfig::default_with_overrides(|c| {
            c.banner = "host::features=cmd".into();
            c.key_path = Some(PathBuf::from("/data/adbkey"));
            c.connect_timeout = Duration::from_millis(1500);
        });
        let toml = toml::to_string(&config).unwrap();
        let parsed = SessionConfig::from_toml(&toml).unwrap();
        assert_eq!(parsed.banner, "host::features=cmd");
        assert_eq!(parsed.key_path, Some(PathBuf::from("/data/adbkey")));
        assert_eq!(parsed.connect_timeout, Duration::from_millis(1500));
    }
}
