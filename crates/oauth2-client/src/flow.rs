//! The local-loopback authorization-code flow, run as the final fallback
//! step of `authenticate` when no cached or refreshable token is available.

use std::{collections::HashMap, time::Duration};

use rand::Rng;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpListener,
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{Config, Error};

const AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Runs the web authorization flow to completion: binds a free local port,
/// logs the authorization URL for the operator, and waits for the callback,
/// an explicit error, cancellation, or a 5-minute timeout. Returns the
/// authorization code and the `redirect_uri` used, which the caller must
/// echo back in the token exchange.
pub(crate) async fn run(config: &Config, scope: CancellationToken) -> Result<(String, String), Error> {
    let listener = TcpListener::bind("127.0.0.1:0").await.map_err(|error| Error::Io(error.to_string()))?;
    let port = listener.local_addr().map_err(|error| Error::Io(error.to_string()))?.port();
    let hostname = config.hostname.clone().unwrap_or_else(|| "localhost".to_string());
    let redirect_uri = format!("http://{hostname}:{port}/callback");
    let state = generate_state();

    let auth_url = format!(
        "{}?client_id={}&redirect_uri={}&scope={}&state={}&response_type=code",
        config.auth_url,
        urlencode(&config.client_id),
        urlencode(&redirect_uri),
        urlencode(&config.scope),
        urlencode(&state),
    );
    info!(url = %auth_url, "open this URL in a browser to authorize");

    let outcome = tokio::select! {
        () = scope.cancelled() => Err(Error::Cancelled),
        result = accept_callback(&listener, &state) => result,
        () = tokio::time::sleep(AUTHORIZATION_TIMEOUT) => Err(Error::AuthorizationTimeout),
    };

    outcome.map(|code| (code, redirect_uri))
}

async fn accept_callback(listener: &TcpListener, expected_state: &str) -> Result<String, Error> {
    loop {
        let (stream, _peer) = listener.accept().await.map_err(|error| Error::Io(error.to_string()))?;
        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        let _ = reader
            .read_line(&mut request_line)
            .await
            .map_err(|error| Error::Io(error.to_string()))?;

        let Some(query) = parse_callback_query(&request_line) else {
            respond(reader.into_inner(), "bad callback request").await;
            continue;
        };

        if let Some(error) = query.get("error") {
            respond(reader.into_inner(), "authorization failed, you may close this window").await;
            return Err(Error::AuthorizationDenied(error.clone()));
        }

        let (Some(code), Some(state)) = (query.get("code"), query.get("state")) else {
            respond(reader.into_inner(), "bad callback request").await;
            continue;
        };

        if state != expected_state {
            respond(reader.into_inner(), "bad callback request").await;
            continue;
        }

        let code = code.clone();
        respond(reader.into_inner(), "authorization complete, you may close this window").await;
        return Ok(code);
    }
}

async fn respond(mut stream: tokio::net::TcpStream, body: &str) {
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Extracts query parameters from a request line like `GET
/// /callback?code=abc&state=xyz HTTP/1.1`.
fn parse_callback_query(request_line: &str) -> Option<HashMap<String, String>> {
    let path = request_line.split_whitespace().nth(1)?;
    let (_, query) = path.split_once('?')?;
    let mut map = HashMap::new();
    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            let _ = map.insert(urldecode(key), urldecode(value));
        }
    }
    Some(map)
}

fn generate_state() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..24).map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char).collect()
}

fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn urldecode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(&raw[i + 1..i + 3], 16) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                out.push(bytes[i]);
                i += 1;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
