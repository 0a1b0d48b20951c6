#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! Authorization-code OAuth2 client with local-loopback redirect, refresh,
//! and authenticated-request retry.

mod client;
mod flow;
mod token;

pub use client::OAuth2Client;
pub use token::{Token, TokenStore};

/// All the errors of this crate.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// [`OAuth2Client::force_refresh`] was called with no cached refresh
    /// token.
    #[error("no refresh token available")]
    NoRefreshToken,

    /// The operator denied authorization, or the provider returned an
    /// `error` callback parameter.
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    /// No callback arrived within 5 minutes of starting the web flow.
    #[error("authorization timed out waiting for the callback")]
    AuthorizationTimeout,

    /// The scope was cancelled while the web flow was in progress.
    #[error("authorization cancelled")]
    Cancelled,

    /// The token endpoint returned a non-2xx response; `kind` is the
    /// decoded `error` field (`invalid_grant`, `invalid_client`,
    /// `invalid_request`, `unsupported_grant_type`, or `unknown_error`).
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// A network-level failure talking to the provider.
    #[error("transient error: {0}")]
    Transient(String),

    /// The local callback server failed to bind or serve.
    #[error("local callback server error: {0}")]
    Io(String),

    /// The token store failed to load or persist.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<kvstore::Error> for Error {
    fn from(error: kvstore::Error) -> Self {
        Error::Storage(error.to_string())
    }
}

/// OAuth2 client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The registered client identifier.
    pub client_id: String,
    /// The registered client secret.
    pub client_secret: String,
    /// The authorization server's authorize endpoint.
    pub auth_url: String,
    /// The authorization server's token endpoint.
    pub token_url: String,
    /// The requested scope string.
    pub scope: String,
    /// Hostname used in the local redirect URI; defaults to `localhost`.
    pub hostname: Option<String>,
}
