//! Loopback redirect receiver for the interactive consent step.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info};
use url::Url;

use drivetool_common::{Error, Result};

/// Upper bound on the request head we are willing to buffer.
const MAX_REQUEST_BYTES: usize = 16 * 1024;

/// How long an accepted connection may take to send its request head.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

const SUCCESS_PAGE: &str = "<html><body><h3>Authorization complete.</h3>\
<p>You can close this window and return to the terminal.</p></body></html>";
const FAILURE_PAGE: &str = "<html><body><h3>Authorization failed.</h3>\
<p>Return to the terminal for details.</p></body></html>";

/// Query parameters delivered to the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    /// Consent granted.
    Code { code: String, state: String },
    /// Consent denied or failed at the provider.
    Denied { error: String },
}

/// One-shot HTTP listener on 127.0.0.1 receiving the OAuth2 redirect.
pub struct LoopbackReceiver {
    listener: TcpListener,
    redirect_uri: String,
    read_timeout: Duration,
}

impl LoopbackReceiver {
    /// Bind an ephemeral local port.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{}/", port);
        debug!("Listening for OAuth2 redirect on {}", redirect_uri);
        Ok(Self {
            listener,
            redirect_uri,
            read_timeout: READ_TIMEOUT,
        })
    }

    /// Override how long a silent connection is waited on.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Redirect URI to register in the authorization request.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Block until the provider redirects back, then return the code.
    ///
    /// Requests that carry no OAuth2 parameters (e.g. a favicon fetch) are
    /// answered with 404 and ignored. Connections that send nothing within
    /// the read timeout (browser preconnects) are dropped.
    ///
    /// # Errors
    /// - `Authentication` if consent was denied or `state` does not match
    pub async fn wait_for_code(self, expected_state: &str) -> Result<String> {
        loop {
            let (mut stream, peer) = self.listener.accept().await?;
            debug!("Redirect connection from {}", peer);

            let read = timeout(self.read_timeout, read_request_target(&mut stream)).await;
            let target = match read {
                Ok(Ok(target)) => target,
                Ok(Err(e)) => {
                    debug!("Ignoring malformed redirect request: {}", e);
                    continue;
                }
                Err(_) => {
                    debug!("Dropping idle connection from {}", peer);
                    continue;
                }
            };

            match parse_callback(&target) {
                None => {
                    respond(&mut stream, "404 Not Found", "").await;
                }
                Some(Callback::Denied { error }) => {
                    respond(&mut stream, "200 OK", FAILURE_PAGE).await;
                    return Err(Error::Authentication(format!(
                        "Authorization was not granted: {}",
                        error
                    )));
                }
                Some(Callback::Code { code, state }) => {
                    if state != expected_state {
                        respond(&mut stream, "400 Bad Request", FAILURE_PAGE).await;
                        return Err(Error::Authentication(
                            "Authorization response state mismatch".to_string(),
                        ));
                    }
                    respond(&mut stream, "200 OK", SUCCESS_PAGE).await;
                    info!("Received authorization code");
                    return Ok(code);
                }
            }
        }
    }
}

/// Extract the OAuth2 parameters from a request target such as `/?code=..&state=..`.
pub fn parse_callback(target: &str) -> Option<Callback> {
    let url = Url::parse("http://127.0.0.1").ok()?.join(target).ok()?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Some(Callback::Denied { error });
    }
    Some(Callback::Code {
        code: code?,
        state: state.unwrap_or_default(),
    })
}

async fn read_request_target(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > MAX_REQUEST_BYTES {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "request head too large",
            ));
        }
    }

    let head = String::from_utf8_lossy(&buf);
    let request_line = head.lines().next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => Ok(target.to_string()),
        _ => Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "expected a GET request",
        )),
    }
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!("Failed to answer redirect request: {}", e);
    }
    let _ = stream.shutdown().await;
}
