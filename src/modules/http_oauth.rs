//! An OAuth2-protected REST collector module (Netatmo-shaped: a weather
//! station API gated behind an authorization-code flow), built on
//! [`oauth2_client::OAuth2Client`] and [`kvstore::KvStore`].
//!
//! Decoding the vendor's actual response schema is out of scope here.
//! As with [`crate::modules::websocket`], every member of the polled JSON
//! response becomes a metric field.

use std::time::Duration;

use async_trait::async_trait;
use metric::{Metric, RawFieldValue};
use metric_channel::MetricSender;
use module::Module;
use oauth2_client::{Config as OAuthConfig, OAuth2Client};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// `custom` settings recognized by this module.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// OAuth2 client identifier.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// The authorization server's authorize endpoint.
    pub auth_url: String,
    /// The authorization server's token endpoint.
    pub token_url: String,
    /// The requested scope string.
    pub scope: String,
    /// The API endpoint to poll on every interval.
    pub api_url: String,
    /// Seconds between polls.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    60
}

/// Polls an OAuth2-protected REST endpoint on a fixed interval and turns
/// each flat JSON object response into one metric.
pub struct HttpOAuthModule {
    config: Config,
    metric_name: String,
    kv_app: String,
    kv_module: String,
}

impl HttpOAuthModule {
    /// Creates a module named `metric_name`, persisting its OAuth2 token
    /// under `kv_app`/`kv_module` (see `kvstore::KvStore::open`).
    pub fn new(metric_name: impl Into<String>, kv_app: impl Into<String>, kv_module: impl Into<String>, config: Config) -> Self {
        Self {
            config,
            metric_name: metric_name.into(),
            kv_app: kv_app.into(),
            kv_module: kv_module.into(),
        }
    }
}

#[async_trait]
impl Module for HttpOAuthModule {
    async fn run(&self, scope: CancellationToken, sender: MetricSender) -> Result<(), String> {
        let store = kvstore::KvStore::open(&self.kv_app, &self.kv_module).map_err(|error| error.to_string())?;
        let oauth = OAuth2Client::new(
            OAuthConfig {
                client_id: self.config.client_id.clone(),
                client_secret: self.config.client_secret.clone(),
                auth_url: self.config.auth_url.clone(),
                token_url: self.config.token_url.clone(),
                scope: self.config.scope.clone(),
                hostname: None,
            },
            store,
        );
        let http = reqwest::Client::new();
        let interval = Duration::from_secs(self.config.interval_secs.max(1));

        loop {
            let api_url = self.config.api_url.clone();
            let response = oauth
                .authenticated_request(scope.clone(), || http.get(&api_url))
                .await
                .map_err(|error| error.to_string())?;

            if response.status().is_success() {
                match response.json::<serde_json::Value>().await {
                    Ok(serde_json::Value::Object(object)) => {
                        let mut metric = Metric::new(&self.metric_name);
                        for (key, raw) in object {
                            metric = metric.field(key, RawFieldValue::from(raw));
                        }
                        let _ = sender.try_send(metric);
                    }
                    Ok(_) => warn!(module = %self.metric_name, "expected a JSON object response"),
                    Err(error) => warn!(module = %self.metric_name, %error, "failed to decode response body"),
                }
            } else {
                warn!(module = %self.metric_name, status = %response.status(), "non-success response, skipping this poll");
            }

            tokio::select! {
                () = scope.cancelled() => return Ok(()),
                () = tokio::time::sleep(interval) => {}
            }
        }
    }
}
