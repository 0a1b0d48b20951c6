//! The reconnecting client loop.

use std::{sync::{Arc, RwLock}, time::Duration};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    backoff::{classify, wait_for, ErrorKind},
    state::{ConnectionState, Observed, StreamClientHandle},
    Config, Error,
};

/// Receives each message read from the stream. A fault while handling one
/// message is logged and does not tear down the connection.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one text or binary message.
    async fn handle_message(&self, message: Message) -> Result<(), String>;
}

/// A reusable reconnecting WebSocket client. Owned by the module task that
/// creates it; its observable state may be shared via [`StreamClient::handle`].
pub struct StreamClient<H: MessageHandler + 'static> {
    config: Config,
    handler: Arc<H>,
    observed: Arc<RwLock<Observed>>,
}

impl<H: MessageHandler + 'static> StreamClient<H> {
    /// Creates a new client for `config`, delivering messages to `handler`.
    pub fn new(config: Config, handler: H) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
            observed: Arc::new(RwLock::new(Observed::default())),
        }
    }

    /// Returns a cheap-to-clone handle onto this client's observable state.
    pub fn handle(&self) -> StreamClientHandle {
        StreamClientHandle {
            inner: self.observed.clone(),
        }
    }

    /// Runs the outer dial/read/backoff loop until `scope` is cancelled or
    /// the client transitions to `Failed`.
    pub async fn run(&self, scope: CancellationToken) -> Result<(), Error> {
        loop {
            if scope.is_cancelled() {
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            let attempts = self.begin_attempt();
            info!(url = %self.config.url, attempts, "dialing stream");

            let request = match self.build_request() {
                Ok(request) => request,
                Err(error) => return self.after_dial_failure(&scope, attempts, error).await,
            };

            let dial = timeout(self.config.connection_timeout, connect_async(request));
            let socket = match dial.await {
                Ok(Ok((stream, _response))) => stream,
                Ok(Err(error)) => return self.after_dial_failure(&scope, attempts, error.to_string()).await,
                Err(_elapsed) => {
                    return self.after_dial_failure(&scope, attempts, "connection timed out".to_string()).await
                }
            };

            self.set_connected();
            info!(url = %self.config.url, "stream connected");

            let read_error = self.read_loop(socket, &scope).await;
            match read_error {
                None => {
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
                Some(error_text) => match classify(&error_text) {
                    ErrorKind::Unrecoverable => {
                        self.set_failed(error_text.clone());
                        return Err(Error::Unrecoverable(error_text));
                    }
                    ErrorKind::Recoverable => {
                        if let Some(result) = self.wait_and_retry(&scope, attempts, error_text).await {
                            return result;
                        }
                    }
                },
            }
        }
    }

    async fn after_dial_failure(&self, scope: &CancellationToken, attempts: u32, error_text: String) -> Result<(), Error> {
        match classify(&error_text) {
            ErrorKind::Unrecoverable => {
                self.set_failed(error_text.clone());
                Err(Error::Unrecoverable(error_text))
            }
            ErrorKind::Recoverable => self.wait_and_retry(scope, attempts, error_text).await.unwrap_or(Ok(())),
        }
    }

    async fn wait_and_retry(&self, scope: &CancellationToken, attempts: u32, error_text: String) -> Option<Result<(), Error>> {
        if attempts >= self.config.max_reconnect_attempts {
            self.set_failed(error_text.clone());
            return Some(Err(Error::MaxAttemptsExceeded {
                attempts,
                last_error: error_text,
            }));
        }

        self.set_reconnecting(error_text.clone());
        let delay = wait_for(&self.config, attempts);
        warn!(attempts, ?delay, error = %error_text, "stream disconnected, backing off");

        tokio::select! {
            () = scope.cancelled() => Some(Ok(())),
            () = tokio::time::sleep(delay) => None,
        }
    }

    /// Builds the WebSocket handshake request for `config.url`, with the
    /// `Origin` header set to `config.origin`.
    fn build_request(&self) -> Result<tokio_tungstenite::tungstenite::http::Request<()>, String> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|error| format!("malformed websocket request: {error}"))?;

        let origin = HeaderValue::from_str(&self.config.origin)
            .map_err(|error| format!("malformed websocket request: invalid origin header: {error}"))?;
        let _ = request.headers_mut().insert(tokio_tungstenite::tungstenite::http::header::ORIGIN, origin);

        Ok(request)
    }

    /// Reads frames until the socket errs, the peer closes, or `scope` is
    /// cancelled. Returns `None` on a clean exit (peer close or cancellation)
    /// and `Some(error text)` otherwise.
    async fn read_loop(
        &self,
        mut socket: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        scope: &CancellationToken,
    ) -> Option<String> {
        loop {
            let next = tokio::select! {
                () = scope.cancelled() => {
                    let _ = timeout(self.config.write_timeout, socket.close(None)).await;
                    return None;
                }
                next = timeout(self.config.read_timeout, socket.next()) => next,
            };

            match next {
                Err(_elapsed) => return Some("read timeout".to_string()),
                Ok(None) => return None,
                Ok(Some(Err(error))) => return Some(error.to_string()),
                Ok(Some(Ok(Message::Close(_)))) => return None,
                Ok(Some(Ok(message))) => {
                    let handler = self.handler.clone();
                    if let Err(error) = handler.handle_message(message).await {
                        warn!(%error, "message handler faulted, continuing");
                    }
                }
            }
        }
    }

    fn begin_attempt(&self) -> u32 {
        let mut guard = self.observed.write().expect("stream client state lock poisoned");
        guard.state = ConnectionState::Connecting;
        guard.attempts += 1;
        guard.attempts
    }

    fn set_connected(&self) {
        let mut guard = self.observed.write().expect("stream client state lock poisoned");
        guard.state = ConnectionState::Connected;
        guard.attempts = 0;
        guard.last_error = None;
    }

    fn set_reconnecting(&self, error_text: String) {
        let mut guard = self.observed.write().expect("stream client state lock poisoned");
        guard.state = ConnectionState::Reconnecting;
        guard.last_error = Some(error_text);
    }

    fn set_failed(&self, error_text: String) {
        let mut guard = self.observed.write().expect("stream client state lock poisoned");
        guard.state = ConnectionState::Failed;
        guard.last_error = Some(error_text);
    }

    fn set_state(&self, state: ConnectionState) {
        self.observed.write().expect("stream client state lock poisoned").state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoOpHandler;

    #[async_trait]
    impl MessageHandler for NoOpHandler {
        async fn handle_message(&self, _message: Message) -> Result<(), String> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn unreachable_host_backs_off_and_is_cancellable() {
        let config = Config::new("ws://127.0.0.1:1").max_reconnect_attempts(2);
        let client = StreamClient::new(config, NoOpHandler);
        let scope = CancellationToken::new();
        let scope_clone = scope.clone();

        let run = tokio::spawn(async move { client.run(scope_clone).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        scope.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), run).await;
        assert!(result.is_ok());
    }

    #[test]
    fn build_request_sets_configured_origin_header() {
        let mut config = Config::new("ws://example.test/feed");
        config.origin = "http://custom-origin.test".to_string();
        let client = StreamClient::new(config, NoOpHandler);

        let request = client.build_request().unwrap();
        assert_eq!(
            request.headers().get(tokio_tungstenite::tungstenite::http::header::ORIGIN).unwrap(),
            "http://custom-origin.test",
        );
    }

    #[test]
    fn build_request_rejects_an_invalid_origin() {
        let mut config = Config::new("ws://example.test/feed");
        config.origin = "not\na valid header value".to_string();
        let client = StreamClient::new(config, NoOpHandler);

        let error = client.build_request().unwrap_err();
        assert!(error.contains("malformed"));
    }
}
