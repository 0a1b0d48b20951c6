//! A WebSocket-fed collector module (OpenDTU-shaped: a solar inverter
//! exposing live readings over a `ws://` push feed), built on
//! [`streamclient::StreamClient`].
//!
//! Decoding the vendor's actual payload schema is out of scope here.
//! This module expects each text frame to be a flat JSON object and turns
//! every member into a metric field via `metric::RawFieldValue`'s
//! `From<serde_json::Value>` coercion, which is representative of the shape
//! a real OpenDTU-style module would parse without committing to its exact
//! field names.

use async_trait::async_trait;
use metric::{Metric, RawFieldValue};
use metric_channel::MetricSender;
use module::Module;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// `custom` settings recognized by this module.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// The WebSocket endpoint to dial.
    pub url: String,
}

struct Handler {
    sender: MetricSender,
    metric_name: String,
}

#[async_trait]
impl streamclient::MessageHandler for Handler {
    async fn handle_message(&self, message: Message) -> Result<(), String> {
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return Ok(()),
            Message::Close(_) => return Ok(()),
        };

        let value: serde_json::Value = serde_json::from_str(&text).map_err(|error| error.to_string())?;
        let serde_json::Value::Object(object) = value else {
            return Err("expected a JSON object".to_string());
        };

        let mut metric = Metric::new(&self.metric_name);
        for (key, raw) in object {
            metric = metric.field(key, RawFieldValue::from(raw));
        }

        let _ = self.sender.try_send(metric);
        Ok(())
    }
}

/// Reconnects to a WebSocket feed and turns each JSON text frame into one
/// metric.
pub struct WebSocketModule {
    config: Config,
    metric_name: String,
}

impl WebSocketModule {
    /// Creates a module named `metric_name` from its `custom` configuration
    /// object.
    pub fn new(metric_name: impl Into<String>, config: Config) -> Self {
        Self {
            config,
            metric_name: metric_name.into(),
        }
    }
}

#[async_trait]
impl Module for WebSocketModule {
    async fn run(&self, scope: CancellationToken, sender: MetricSender) -> Result<(), String> {
        let stream_config = streamclient::Config::new(self.config.url.clone());
        let handler = Handler {
            sender,
            metric_name: self.metric_name.clone(),
        };
        let client = streamclient::StreamClient::new(stream_config, handler);

        match client.run(scope).await {
            Ok(()) => Ok(()),
            Err(error) => Err(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metric_channel::MetricChannel;

    #[tokio::test]
    async fn handler_turns_json_object_into_metric_fields() {
        let channel = MetricChannel::new();
        let sender = channel.sender_for("opendtu");
        let handler = Handler {
            sender,
            metric_name: "inverter".to_string(),
        };

        let message = Message::text(r#"{"power_w": 420, "online": true}"#);
        handler.handle_message(message).await.unwrap();
    }

    #[tokio::test]
    async fn non_object_payload_is_rejected() {
        let channel = MetricChannel::new();
        let sender = channel.sender_for("opendtu");
        let handler = Handler {
            sender,
            metric_name: "inverter".to_string(),
        };

        let message = Message::text("42");
        assert!(handler.handle_message(message).await.is_err());
    }
}
