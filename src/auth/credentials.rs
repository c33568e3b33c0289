//! Durable OAuth credential records.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A full OAuth credential set.
///
/// Either absent entirely (no prior authorization) or fully populated; a
/// partial record is never persisted. Created on first successful code
/// exchange, rewritten in place on every refresh, never deleted
/// automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Developer app client id.
    pub client_id: String,
    /// Developer app client secret.
    pub client_secret: String,
    /// Current access token.
    pub access_token: String,
    /// Refresh token, when the provider issued one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Authenticated member id (userinfo `sub`).
    pub member_id: String,
    /// Absolute access-token expiry, seconds since epoch.
    pub expires_at: i64,
}

impl Credentials {
    /// Whether the access token expires within `window_secs` from now.
    #[must_use]
    pub fn expires_within(&self, window_secs: i64) -> bool {
        self.expires_at - Utc::now().timestamp() < window_secs
    }
}

/// Load/save of the single per-installation credential file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store backed by the given file.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store at the default per-user location (`~/.lisync/credentials.json`).
    pub fn default_location() -> Result<Self> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        Ok(Self::new(home.join(".lisync").join("credentials.json")))
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored record. Missing and malformed files both read as
    /// "no credentials" - re-authorizing is the recovery either way.
    #[must_use]
    pub fn load(&self) -> Option<Credentials> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(creds) => Some(creds),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Credential file malformed, treating as absent"
                );
                None
            }
        }
    }

    /// Durably write a fully-populated record. The write goes through a
    /// sibling temp file and a rename so no partial record is ever visible.
    pub fn save(&self, creds: &Credentials) -> Result<()> {
        let content = serde_json::to_string_pretty(creds)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Credentials {
        Credentials {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            access_token: "tok".to_string(),
            refresh_token: Some("refresh".to_string()),
            member_id: "abc123".to_string(),
            expires_at: Utc::now().timestamp() + 3600,
        }
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("nested").join("credentials.json"));

        store.save(&sample()).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.access_token, "tok");
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(loaded.member_id, "abc123");
    }

    #[test]
    fn test_missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        assert!(store.load().is_none());
    }

    #[test]
    fn test_malformed_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        std::fs::write(store.path(), "not json at all").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_expiry_window() {
        let mut creds = sample();
        creds.expires_at = Utc::now().timestamp() + 2 * 86_400;
        assert!(!creds.expires_within(86_400));

        creds.expires_at = Utc::now().timestamp() + 3600;
        assert!(creds.expires_within(86_400));
    }
}
