//! The token record persisted in the KV store.

use chrono::{DateTime, Duration, Utc};
use kvstore::KvStore;
use serde::{Deserialize, Serialize};

const TOKEN_KEY: &str = "oauth2_token";

/// A cached OAuth2 token, as stored under key `oauth2_token`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    /// The bearer access token.
    pub access_token: String,
    /// The refresh token, if the authorization server issued one.
    pub refresh_token: Option<String>,
    /// When `access_token` expires.
    pub expires_at: DateTime<Utc>,
    /// The client this token was issued to. A stored record whose
    /// `client_id` does not match the current configuration is discarded as
    /// if absent.
    pub client_id: String,
    /// When this record was last written.
    pub last_updated: DateTime<Utc>,
}

impl Token {
    /// Whether this token can be used as-is: belongs to `client_id` and has
    /// at least 5 minutes of validity left.
    pub(crate) fn is_fresh(&self, client_id: &str, now: DateTime<Utc>) -> bool {
        self.client_id == client_id && now + Duration::minutes(5) < self.expires_at
    }
}

/// Storage for a single cached token. Implemented for [`kvstore::KvStore`] so
/// the OAuth2 client stays storage-agnostic.
pub trait TokenStore: Send + Sync {
    /// Loads the cached token, if any matches the current schema.
    fn load_token(&self) -> Option<Token>;
    /// Persists `token`, replacing any prior entry.
    fn save_token(&self, token: &Token) -> Result<(), crate::Error>;
}

impl TokenStore for KvStore {
    fn load_token(&self) -> Option<Token> {
        self.get(TOKEN_KEY).and_then(|value| serde_json::from_value(value).ok())
    }

    fn save_token(&self, token: &Token) -> Result<(), crate::Error> {
        let value = serde_json::to_value(token).map_err(|error| crate::Error::Storage(error.to_string()))?;
        self.set(TOKEN_KEY, value).map_err(crate::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_fresh_only_for_matching_client_with_margin() {
        let now = Utc::now();
        let token = Token {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_at: now + Duration::minutes(10),
            client_id: "abc".to_string(),
            last_updated: now,
        };
        assert!(token.is_fresh("abc", now));
        assert!(!token.is_fresh("other", now));
        assert!(!token.is_fresh("abc", now + Duration::minutes(6)));
    }

    #[test]
    fn store_round_trips_through_kvstore() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open_at(dir.path().join("tok.json"));
        let now = Utc::now();
        let token = Token {
            access_token: "a".to_string(),
            refresh_token: Some("r".to_string()),
            expires_at: now,
            client_id: "abc".to_string(),
            last_updated: now,
        };
        store.save_token(&token).unwrap();
        assert_eq!(store.load_token().unwrap(), token);
    }
}
