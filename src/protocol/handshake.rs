//! Client side of the opening handshake (RFC 6455 Section 4.1).
//!
//! Builds the HTTP Upgrade request and checks the server's response.

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::config::Endpoint;
use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes the Sec-WebSocket-Accept value for a Sec-WebSocket-Key.
///
/// The accept key is Base64(SHA-1(key + GUID)).
///
/// ```
/// use wsboot::protocol::handshake::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a random 16-byte nonce, base64 encoded.
///
/// # Errors
///
/// Returns `Error::Io` if the OS entropy source fails.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce).map_err(|e| Error::Io(e.to_string()))?;
    Ok(BASE64.encode(nonce))
}

/// Position just past the `\r\n\r\n` that ends the response head.
#[must_use]
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Headers keyed by lowercase name. Repeated headers are comma-joined.
fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> HashMap<String, String> {
    let mut headers: HashMap<String, String> = HashMap::new();
    for line in lines.take_while(|l| !l.is_empty()) {
        if let Some((name, value)) = line.split_once(':') {
            headers
                .entry(name.trim().to_ascii_lowercase())
                .and_modify(|v| {
                    v.push_str(", ");
                    v.push_str(value.trim());
                })
                .or_insert_with(|| value.trim().to_string());
        }
    }
    headers
}

/// An opening handshake in progress: the request we send and the nonce the
/// response must answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHandshake {
    resource: String,
    host: String,
    key: String,
}

impl ClientHandshake {
    /// Prepare a handshake for `endpoint` with a fresh random key.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if no random key can be generated.
    pub fn new(endpoint: &Endpoint) -> Result<Self> {
        Ok(Self::with_key(endpoint, generate_key()?))
    }

    /// Prepare a handshake with a caller-chosen key.
    #[must_use]
    pub fn with_key(endpoint: &Endpoint, key: impl Into<String>) -> Self {
        Self {
            resource: endpoint.resource().to_string(),
            host: endpoint.host_header(),
            key: key.into(),
        }
    }

    /// The Sec-WebSocket-Key sent to the server.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Serialize the HTTP Upgrade request.
    #[must_use]
    pub fn request(&self) -> Vec<u8> {
        format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             \r\n",
            self.resource, self.host, self.key
        )
        .into_bytes()
    }

    /// Check that `response` completes this handshake.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` if the accept key does not match, or
    /// if the server selected a subprotocol or extension that was never
    /// offered.
    pub fn verify(&self, response: &HandshakeResponse) -> Result<()> {
        let expected = compute_accept_key(&self.key);
        if response.accept != expected {
            return Err(Error::InvalidHandshake(format!(
                "Sec-WebSocket-Accept mismatch: expected {expected}, got {}",
                response.accept
            )));
        }
        if let Some(protocol) = &response.protocol {
            return Err(Error::InvalidHandshake(format!(
                "Server selected unrequested subprotocol: {protocol}"
            )));
        }
        if !response.extensions.is_empty() {
            return Err(Error::InvalidHandshake(format!(
                "Server negotiated unrequested extensions: {}",
                response.extensions.join(", ")
            )));
        }
        Ok(())
    }
}

/// Parsed server handshake response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The Sec-WebSocket-Accept value.
    pub accept: String,
    /// The selected Sec-WebSocket-Protocol, if any.
    pub protocol: Option<String>,
    /// The Sec-WebSocket-Extensions values, if any.
    pub extensions: Vec<String>,
}

impl HandshakeResponse {
    /// Parse the response head (status line and headers).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if:
    /// - The data is not valid UTF-8 or is empty.
    /// - The status is not `101 Switching Protocols`.
    /// - `Upgrade`, `Connection` or `Sec-WebSocket-Accept` is missing or wrong.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;
        let mut lines = text.lines();

        let status_line = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;
        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        let status = parts.next().unwrap_or_default();
        if !version.starts_with("HTTP/1.1") || status != "101" {
            return Err(Error::InvalidHandshake(format!(
                "Expected 101 status, got: {status_line}"
            )));
        }

        let headers = parse_headers(lines);

        let upgrade = headers
            .get("upgrade")
            .ok_or_else(|| Error::InvalidHandshake("Missing Upgrade header in response".into()))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Upgrade header: {upgrade}"
            )));
        }

        let connection = headers.get("connection").ok_or_else(|| {
            Error::InvalidHandshake("Missing Connection header in response".into())
        })?;
        if !connection
            .split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Connection header: {connection}"
            )));
        }

        let accept = headers
            .get("sec-websocket-accept")
            .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Accept header".into()))?
            .clone();

        let protocol = headers
            .get("sec-websocket-protocol")
            .filter(|p| !p.is_empty())
            .cloned();

        let extensions = headers
            .get("sec-websocket-extensions")
            .map(|e| {
                e.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            accept,
            protocol,
            extensions,
        })
    }
}
