//! The OAuth2 client: `authenticate`, `force_refresh`, `authenticated_request`.

use chrono::{Duration, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{flow, token::TokenStore, Config, Error, Token};

/// Authorization-code OAuth2 client with local-loopback redirect, token
/// refresh, and authenticated-request retry.
pub struct OAuth2Client<S: TokenStore> {
    config: Config,
    store: S,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl<S: TokenStore> OAuth2Client<S> {
    /// Creates a client for `config`, persisting tokens in `store`.
    pub fn new(config: Config, store: S) -> Self {
        Self {
            config,
            store,
            http: reqwest::Client::new(),
        }
    }

    /// Returns a valid token: a cached one if still fresh, a refreshed one
    /// if a refresh token is cached, or the result of running the full web
    /// authorization flow.
    pub async fn authenticate(&self, scope: CancellationToken) -> Result<Token, Error> {
        let now = Utc::now();

        if let Some(cached) = self.store.load_token() {
            if cached.is_fresh(&self.config.client_id, now) {
                return Ok(cached);
            }

            if let Some(refresh_token) = cached.refresh_token.clone() {
                match self.refresh(&refresh_token).await {
                    Ok(refreshed) => {
                        self.store.save_token(&refreshed)?;
                        return Ok(refreshed);
                    }
                    Err(error) => warn!(%error, "cached refresh token failed, falling back to web flow"),
                }
            }
        }

        let (code, redirect_uri) = flow::run(&self.config, scope).await?;
        let token = self.exchange_code(&code, &redirect_uri).await?;
        self.store.save_token(&token)?;
        Ok(token)
    }

    /// Bypasses the expiry check and refreshes unconditionally. Fails with
    /// [`Error::NoRefreshToken`] if no refresh token is cached.
    pub async fn force_refresh(&self, _scope: CancellationToken) -> Result<Token, Error> {
        let cached = self.store.load_token().ok_or(Error::NoRefreshToken)?;
        let refresh_token = cached.refresh_token.ok_or(Error::NoRefreshToken)?;
        let token = self.refresh(&refresh_token).await?;
        self.store.save_token(&token)?;
        Ok(token)
    }

    /// Performs `build`'s request with a bearer token attached. The *first*
    /// `401`/`403` response triggers exactly one [`Self::force_refresh`] and
    /// one retry; a `401`/`403` on the retry is returned to the caller
    /// as-is rather than refreshing again.
    pub async fn authenticated_request<F>(&self, scope: CancellationToken, mut build: F) -> Result<reqwest::Response, Error>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut refreshed_once = false;

        loop {
            let token = self.authenticate(scope.clone()).await?;
            let attempt_response = build()
                .bearer_auth(&token.access_token)
                .send()
                .await
                .map_err(|error| Error::Transient(error.to_string()))?;

            let status = attempt_response.status().as_u16();
            if (status == 401 || status == 403) && !refreshed_once {
                drop(attempt_response);
                refreshed_once = true;
                let _ = self.force_refresh(scope.clone()).await?;
                continue;
            }

            return Ok(attempt_response);
        }
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Token, Error> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        self.token_request(&params).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Token, Error> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        self.token_request(&params).await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<Token, Error> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(params)
            .send()
            .await
            .map_err(|error| Error::Transient(error.to_string()))?;

        if !response.status().is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let kind = body.get("error").and_then(|v| v.as_str()).unwrap_or("unknown_error").to_string();
            return Err(Error::TokenExchangeFailed(kind));
        }

        let body: TokenResponse = response.json().await.map_err(|error| Error::Transient(error.to_string()))?;
        let now = Utc::now();
        Ok(Token {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_at: now + Duration::seconds(body.expires_in.unwrap_or(3600)),
            client_id: self.config.client_id.clone(),
            last_updated: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvstore::KvStore;

    fn config() -> Config {
        Config {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            auth_url: "https://auth.example.test/authorize".to_string(),
            token_url: "https://auth.example.test/token".to_string(),
            scope: "metrics.read".to_string(),
            hostname: None,
        }
    }

    #[tokio::test]
    async fn authenticate_returns_cached_fresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open_at(dir.path().join("tok.json"));
        let now = Utc::now();
        store
            .save_token(&Token {
                access_token: "cached".to_string(),
                refresh_token: None,
                expires_at: now + Duration::hours(1),
                client_id: "client".to_string(),
                last_updated: now,
            })
            .unwrap();

        let client = OAuth2Client::new(config(), store);
        let token = client.authenticate(CancellationToken::new()).await.unwrap();
        assert_eq!(token.access_token, "cached");
    }

    #[tokio::test]
    async fn force_refresh_without_token_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open_at(dir.path().join("tok.json"));
        let client = OAuth2Client::new(config(), store);
        let result = client.force_refresh(CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::NoRefreshToken)));
    }

    #[tokio::test]
    async fn cached_token_for_different_client_id_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open_at(dir.path().join("tok.json"));
        let now = Utc::now();
        store
            .save_token(&Token {
                access_token: "cached".to_string(),
                refresh_token: None,
                expires_at: now + Duration::hours(1),
                client_id: "someone-else".to_string(),
                last_updated: now,
            })
            .unwrap();

        assert!(!store.load_token().unwrap().is_fresh("client", now));
    }
}
