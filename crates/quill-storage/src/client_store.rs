//! Typed API over durable client storage.

use crate::{DurableStorage, StorageError, StorageKeys, StorageResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// The last confirmed login, written on every successful authentication
/// event and read once at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedAuthRecord {
    pub user_id: String,
    pub saved_at_epoch_millis: i64,
}

impl PersistedAuthRecord {
    pub fn new(user_id: impl Into<String>, saved_at_epoch_millis: i64) -> Self {
        Self {
            user_id: user_id.into(),
            saved_at_epoch_millis,
        }
    }

    /// Age of the record at `now_millis`. Records stamped in the future
    /// (clock skew) count as age zero.
    pub fn age(&self, now_millis: i64) -> Duration {
        let age = now_millis.saturating_sub(self.saved_at_epoch_millis).max(0);
        Duration::from_millis(age as u64)
    }

    /// True once the record is older than `ttl`.
    pub fn is_expired(&self, now_millis: i64, ttl: Duration) -> bool {
        self.age(now_millis) > ttl
    }
}

/// Session lifetime hints returned by the server on login and refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLifetimes {
    /// Access token lifetime, in seconds.
    pub token_lifetime: Option<u64>,
    /// Refresh token lifetime, in seconds.
    pub refresh_token_lifetime: Option<u64>,
}

impl SessionLifetimes {
    pub fn is_empty(&self) -> bool {
        self.token_lifetime.is_none() && self.refresh_token_lifetime.is_none()
    }
}

/// High-level API for the session artefacts kept in durable storage.
#[derive(Clone)]
pub struct ClientStore {
    storage: Arc<dyn DurableStorage>,
}

impl ClientStore {
    /// Create a new client store over the given backend
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self { storage }
    }

    /// Shared handle to the backend, for components that persist their own keys.
    pub fn backend(&self) -> Arc<dyn DurableStorage> {
        Arc::clone(&self.storage)
    }

    // ==========================================
    // Persisted Auth Record
    // ==========================================

    pub fn save_auth_record(&self, record: &PersistedAuthRecord) -> StorageResult<()> {
        let json =
            serde_json::to_string(record).map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.storage.set(StorageKeys::PERSISTED_AUTH, &json)
    }

    pub fn load_auth_record(&self) -> StorageResult<Option<PersistedAuthRecord>> {
        match self.storage.get(StorageKeys::PERSISTED_AUTH)? {
            Some(json) => {
                let record: PersistedAuthRecord = serde_json::from_str(&json)
                    .map_err(|e| StorageError::Encoding(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub fn clear_auth_record(&self) -> StorageResult<bool> {
        self.storage.delete(StorageKeys::PERSISTED_AUTH)
    }

    // ==========================================
    // Device Fingerprint
    // ==========================================

    pub fn device_fingerprint(&self) -> StorageResult<Option<String>> {
        Ok(self
            .storage
            .get(StorageKeys::DEVICE_FINGERPRINT)?
            .filter(|fingerprint| !fingerprint.is_empty()))
    }

    pub fn set_device_fingerprint(&self, fingerprint: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::DEVICE_FINGERPRINT, fingerprint)
    }

    // ==========================================
    // Session Lifetime Hints
    // ==========================================

    /// Persist whichever hints are present; absent hints leave the stored
    /// value untouched.
    pub fn save_lifetimes(&self, lifetimes: &SessionLifetimes) -> StorageResult<()> {
        if let Some(seconds) = lifetimes.token_lifetime {
            self.storage
                .set(StorageKeys::TOKEN_LIFETIME, &seconds.to_string())?;
        }
        if let Some(seconds) = lifetimes.refresh_token_lifetime {
            self.storage
                .set(StorageKeys::REFRESH_TOKEN_LIFETIME, &seconds.to_string())?;
        }
        Ok(())
    }

    /// Read the stored hints. Unparseable values read as absent.
    pub fn lifetimes(&self) -> StorageResult<SessionLifetimes> {
        let read = |key: &str| -> StorageResult<Option<u64>> {
            Ok(self
                .storage
                .get(key)?
                .and_then(|raw| raw.trim().parse::<u64>().ok()))
        };
        Ok(SessionLifetimes {
            token_lifetime: read(StorageKeys::TOKEN_LIFETIME)?,
            refresh_token_lifetime: read(StorageKeys::REFRESH_TOKEN_LIFETIME)?,
        })
    }

    pub fn clear_lifetimes(&self) -> StorageResult<()> {
        self.storage.delete(StorageKeys::TOKEN_LIFETIME)?;
        self.storage.delete(StorageKeys::REFRESH_TOKEN_LIFETIME)?;
        Ok(())
    }

    // ==========================================
    // Cookie Jar Snapshot
    // ==========================================

    pub fn cookie_jar_snapshot(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::COOKIE_JAR)
    }

    pub fn set_cookie_jar_snapshot(&self, snapshot: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::COOKIE_JAR, snapshot)
    }

    // ==========================================
    // Clearing
    // ==========================================

    /// Forget the logged-in session: auth record and lifetime hints.
    /// The device fingerprint outlives sessions.
    pub fn clear_session(&self) -> StorageResult<()> {
        self.clear_auth_record()?;
        self.clear_lifetimes()
    }

    /// Remove every key this crate owns, attempting all of them before
    /// reporting the first failure.
    pub fn clear_all(&self) -> StorageResult<()> {
        let mut first_error = None;
        for key in StorageKeys::ALL {
            if let Err(e) = self.storage.delete(key) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
