//! Bearer credential lifecycle.
//!
//! A credential is fetched with a client-credentials exchange and persisted
//! through a [`TokenStore`], so a later process can reuse it until it expires.
//! The store is injected: file-backed in production, in-memory in tests.
//! Concurrent processes sharing one cache file need external locking.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::cache_validator::ValidatedCacheEntry;
use crate::errors::{truncate, PipelineError, MAX_ERROR_BODY_CHARS};
use crate::laas_models::{TokenRequest, TokenResponse};

/// Subtracted from the server-reported lifetime to absorb clock skew.
pub const EXPIRY_SAFETY_MARGIN_SECS: i64 = 15;

/// Used when the token endpoint omits `expiresIn`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// An opaque bearer token and the instant it stops being usable.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "accessToken")]
    token: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn bearer(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// First characters of the token, for operator output.
    pub fn masked(&self) -> String {
        let prefix: String = self.token.chars().take(6).collect();
        format!("{}...", prefix)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Durable home of the cached credential.
pub trait TokenStore: Send + Sync {
    /// Returns the stored credential, expired or not.
    fn load(&self) -> Result<Option<Credential>, PipelineError>;
    fn save(&self, credential: &Credential) -> Result<(), PipelineError>;
}

/// JSON file store with a checksum envelope.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<Credential>, PipelineError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)?;
        // A corrupt file is a cache miss, not an error
        Ok(ValidatedCacheEntry::open::<Credential>(&contents))
    }

    fn save(&self, credential: &Credential) -> Result<(), PipelineError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let serialized = ValidatedCacheEntry::seal(credential)?.to_json()?;

        // Write-then-rename so a crash never leaves a half-written cache
        let tmp = self.path.with_extension("json.tmp");
        write_private(&tmp, serialized.as_bytes())?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Writes `contents` to a fresh file readable only by its owner on unix.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    // A leftover file would keep its old mode
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

/// In-process store for tests and dry runs.
#[derive(Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryTokenStore {
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<Credential>, PipelineError> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| PipelineError::Storage("token store lock poisoned".to_string()))?;
        Ok(slot.clone())
    }

    fn save(&self, credential: &Credential) -> Result<(), PipelineError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| PipelineError::Storage("token store lock poisoned".to_string()))?;
        *slot = Some(credential.clone());
        Ok(())
    }
}

/// Hands out a valid bearer credential, refreshing it only when needed.
pub struct CredentialCache {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    store: Arc<dyn TokenStore>,
}

impl CredentialCache {
    pub fn new(
        http: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            store,
        }
    }

    /// Returns the cached credential while it is unexpired, otherwise exchanges
    /// the client credentials for a new one and persists it.
    pub async fn get_token(&self, force_refresh: bool) -> Result<Credential, PipelineError> {
        if !force_refresh {
            match self.store.load() {
                Ok(Some(cached)) if cached.is_valid_at(Utc::now()) => {
                    tracing::debug!(expires_at = %cached.expires_at(), "Using cached credential");
                    return Ok(cached);
                }
                Ok(Some(expired)) => {
                    tracing::info!(expired_at = %expired.expires_at(), "Cached credential expired");
                }
                Ok(None) => tracing::debug!("No cached credential"),
                Err(e) => tracing::warn!("Credential cache unreadable, refreshing: {}", e),
            }
        } else {
            tracing::info!("Forced credential refresh");
        }

        let credential = self.exchange().await?;
        if let Err(e) = self.store.save(&credential) {
            // The credential is still usable for this run
            tracing::warn!("Failed to persist credential: {}", e);
        }
        Ok(credential)
    }

    async fn exchange(&self) -> Result<Credential, PipelineError> {
        tracing::info!("Requesting bearer token from {}", self.token_url);
        let issued_at = Utc::now();

        let response = self
            .http
            .post(&self.token_url)
            .json(&TokenRequest::client_credentials(
                &self.client_id,
                &self.client_secret,
            ))
            .send()
            .await
            .map_err(|e| PipelineError::Auth {
                status: None,
                message: self.redact(&format!("token request failed: {}", e.without_url())),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("Token endpoint returned {}", status);
            return Err(PipelineError::Auth {
                status: Some(status.as_u16()),
                message: truncate(&self.redact(&body), MAX_ERROR_BODY_CHARS),
            });
        }

        let body: TokenResponse = response.json().await.map_err(|e| PipelineError::Auth {
            status: Some(status.as_u16()),
            message: self.redact(&format!("malformed token response: {}", e.without_url())),
        })?;

        if body.access_token.trim().is_empty() {
            return Err(PipelineError::Auth {
                status: Some(status.as_u16()),
                message: "token missing in response".to_string(),
            });
        }

        let lifetime = body.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS).max(0);
        let usable = (lifetime - EXPIRY_SAFETY_MARGIN_SECS).max(0);
        let credential = Credential::new(body.access_token, issued_at + Duration::seconds(usable));

        tracing::info!(expires_at = %credential.expires_at(), "Obtained new bearer token");
        Ok(credential)
    }

    fn redact(&self, text: &str) -> String {
        redact_secrets(text, &[&self.client_secret, &self.client_id])
    }
}

/// Replaces every occurrence of each non-empty secret with `[REDACTED]`.
pub fn redact_secrets(text: &str, secrets: &[&str]) -> String {
    secrets
        .iter()
        .filter(|s| !s.is_empty())
        .fold(text.to_string(), |acc, secret| acc.replace(secret, "[REDACTED]"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_output_hides_token() {
        let credential = Credential::new("super-secret-token", Utc::now());
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("super-secret-token"));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(credential.masked(), "super-...");
    }

    #[test]
    fn test_validity_is_strict() {
        let now = Utc::now();
        assert!(Credential::new("t", now + Duration::seconds(1)).is_valid_at(now));
        assert!(!Credential::new("t", now).is_valid_at(now));
    }

    #[test]
    fn test_redact_secrets() {
        let text = "invalid client 175482 with secret dc190e (secret dc190e)";
        let redacted = redact_secrets(text, &["dc190e", "175482", ""]);
        assert_eq!(
            redacted,
            "invalid client [REDACTED] with secret [REDACTED] (secret [REDACTED])"
        );
    }

    #[test]
    fn test_file_store_round_trip_and_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested").join("token.json"));
        assert_eq!(store.load().unwrap(), None);

        let expires_at = DateTime::from_timestamp(1_900_000_000, 0).unwrap();
        let credential = Credential::new("abc123", expires_at);
        store.save(&credential).unwrap();
        assert_eq!(store.load().unwrap(), Some(credential));

        std::fs::write(store.path(), "{\"data\":\"{}\",\"checksum\":\"bad\"}").unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_owner_only_even_over_stale_temp_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("token.json"));

        let stale = store.path().with_extension("json.tmp");
        std::fs::write(&stale, "leftover").unwrap();
        std::fs::set_permissions(&stale, std::fs::Permissions::from_mode(0o644)).unwrap();

        let expires_at = DateTime::from_timestamp(1_900_000_000, 0).unwrap();
        let credential = Credential::new("abc123", expires_at);
        store.save(&credential).unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!stale.exists());
        assert_eq!(store.load().unwrap(), Some(credential));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryTokenStore::default();
        assert_eq!(store.load().unwrap(), None);

        let credential = Credential::new("abc", Utc::now());
        store.save(&credential).unwrap();
        assert_eq!(store.load().unwrap(), Some(credential));
    }
}
