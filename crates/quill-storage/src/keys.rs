//! Storage key constants.

/// Keys used in durable client storage.
pub struct StorageKeys;

impl StorageKeys {
    /// Last confirmed login (JSON `PersistedAuthRecord`)
    pub const PERSISTED_AUTH: &'static str = "persisted_auth";

    /// Device fingerprint hash
    pub const DEVICE_FINGERPRINT: &'static str = "device_fingerprint";

    /// Access token lifetime hint, in seconds
    pub const TOKEN_LIFETIME: &'static str = "token_lifetime";

    /// Refresh token lifetime hint, in seconds
    pub const REFRESH_TOKEN_LIFETIME: &'static str = "refresh_token_lifetime";

    /// Cookie jar snapshot (JSON)
    pub const COOKIE_JAR: &'static str = "cookie_jar";

    /// Every key, for bulk clearing.
    pub const ALL: [&'static str; 5] = [
        Self::PERSISTED_AUTH,
        Self::DEVICE_FINGERPRINT,
        Self::TOKEN_LIFETIME,
        Self::REFRESH_TOKEN_LIFETIME,
        Self::COOKIE_JAR,
    ];
}
