//! Response body extraction for session endpoints.
//!
//! The server is not strict about shapes: ids arrive as numbers or strings,
//! the user may sit at the top level or under `user`, and lifetimes may be
//! numbers or numeric strings. Everything here reads from a
//! [`serde_json::Value`] and treats missing pieces as absent.

use quill_storage::SessionLifetimes;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Opaque server-assigned user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read an id from a JSON number or non-empty string.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self(n.to_string())),
            Value::String(s) if !s.trim().is_empty() => Some(Self(s.trim().to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        UserId::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom("user id must be a number or non-empty string"))
    }
}

/// User id from `user.id`, falling back to a top-level `id`.
pub(crate) fn user_id_from(body: &Value) -> Option<UserId> {
    body.get("user")
        .and_then(|user| user.get("id"))
        .and_then(UserId::from_value)
        .or_else(|| body.get("id").and_then(UserId::from_value))
}

fn seconds_from(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Lifetime hints carried by login, refresh and token-settings responses.
pub(crate) fn lifetimes_from(body: &Value) -> SessionLifetimes {
    SessionLifetimes {
        token_lifetime: seconds_from(body.get("token_lifetime")),
        refresh_token_lifetime: seconds_from(body.get("refresh_token_lifetime")),
    }
}

/// Profile returned by the identity endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Any other fields the server returns.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl UserProfile {
    /// Parse a profile from the body itself or from its `user` member.
    pub fn from_value(body: &Value) -> Option<Self> {
        serde_json::from_value(body.clone())
            .ok()
            .or_else(|| serde_json::from_value(body.get("user")?.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_id_accepts_numbers_and_strings() {
        assert_eq!(UserId::from_value(&json!(42)), Some(UserId::from("42")));
        assert_eq!(UserId::from_value(&json!(" 7 ")), Some(UserId::from("7")));
        assert_eq!(UserId::from_value(&json!("")), None);
        assert_eq!(UserId::from_value(&json!(null)), None);

        let id: UserId = serde_json::from_value(json!(9)).unwrap();
        assert_eq!(id.as_str(), "9");
        assert!(serde_json::from_value::<UserId>(json!({"id": 1})).is_err());
    }

    #[test]
    fn test_user_id_from_nested_or_top_level() {
        assert_eq!(
            user_id_from(&json!({"user": {"id": 1, "username": "ada"}})),
            Some(UserId::from("1"))
        );
        assert_eq!(user_id_from(&json!({"id": "u-2"})), Some(UserId::from("u-2")));
        assert_eq!(user_id_from(&json!({"msg": "Token refreshed"})), None);
        assert_eq!(user_id_from(&json!([1, 2])), None);
    }

    #[test]
    fn test_lifetimes_from_body() {
        let lifetimes = lifetimes_from(&json!({
            "token_lifetime": 1800,
            "refresh_token_lifetime": "1296000"
        }));
        assert_eq!(lifetimes.token_lifetime, Some(1800));
        assert_eq!(lifetimes.refresh_token_lifetime, Some(1_296_000));

        let lifetimes = lifetimes_from(&json!({"token_lifetime": -5}));
        assert!(lifetimes.is_empty());
    }

    #[test]
    fn test_profile_from_either_shape() {
        let profile = UserProfile::from_value(&json!({
            "id": 3,
            "username": "grace",
            "email": "grace@example.com",
            "created_at": "2024-01-01"
        }))
        .unwrap();
        assert_eq!(profile.id, UserId::from("3"));
        assert_eq!(profile.username.as_deref(), Some("grace"));
        assert_eq!(profile.extra.get("created_at"), Some(&json!("2024-01-01")));

        let nested = UserProfile::from_value(&json!({"user": {"id": 4}})).unwrap();
        assert_eq!(nested.id, UserId::from("4"));
        assert!(nested.email.is_none());

        assert!(UserProfile::from_value(&json!({"msg": "nope"})).is_none());
    }
}
