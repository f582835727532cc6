//! Client configuration: endpoint, resource limits and timeouts.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

/// Endpoint the client connects to when none is configured.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:4242/ws";

/// Configuration limits for the inbound side of a connection.
///
/// These limits bound memory use when reading from an untrusted server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a single frame in bytes.
    ///
    /// Default: 16 MB (16 * 1024 * 1024)
    pub max_frame_size: usize,

    /// Maximum size of a complete message in bytes, after reassembly.
    ///
    /// Default: 64 MB (64 * 1024 * 1024)
    pub max_message_size: usize,

    /// Maximum number of fragments in a single message.
    ///
    /// Default: 128
    pub max_fragment_count: usize,

    /// Maximum size of the handshake response headers in bytes.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,
            max_message_size: 64 * 1024 * 1024,
            max_fragment_count: 128,
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_fragment_count: usize,
        max_handshake_size: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_fragment_count,
            max_handshake_size,
        }
    }

    /// Validate that message size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<()> {
        if size > self.max_message_size {
            Err(Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that frame size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: usize) -> Result<()> {
        if size > self.max_frame_size {
            Err(Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that fragment count is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyFragments`] if `count` exceeds the configured maximum.
    pub const fn check_fragment_count(&self, count: usize) -> Result<()> {
        if count > self.max_fragment_count {
            Err(Error::TooManyFragments {
                count,
                max: self.max_fragment_count,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that handshake size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<()> {
        if size > self.max_handshake_size {
            Err(Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// A `ws://` endpoint split into the parts the handshake needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    resource: String,
}

impl Endpoint {
    /// Parse a `ws://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if the URL does not parse, uses a
    /// scheme other than `ws`, or has no host.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input)?;

        match url.scheme() {
            "ws" => {}
            "wss" => {
                return Err(Error::InvalidEndpoint(
                    "wss:// endpoints are not supported".into(),
                ));
            }
            other => {
                return Err(Error::InvalidEndpoint(format!(
                    "expected ws:// scheme, got {other}://"
                )));
            }
        }

        if url.fragment().is_some() {
            return Err(Error::InvalidEndpoint(
                "fragment identifiers are not allowed".into(),
            ));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::InvalidEndpoint("missing host".into()))?
            .to_string();
        let port = url.port_or_known_default().unwrap_or(80);

        let mut resource = url.path().to_string();
        if resource.is_empty() {
            resource.push('/');
        }
        if let Some(query) = url.query() {
            resource.push('?');
            resource.push_str(query);
        }

        Ok(Self {
            host,
            port,
            resource,
        })
    }

    /// Host name or address, IPv6 literals in brackets.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Request target for the handshake: path plus optional query.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Value for the `Host` header; the port is omitted when it is 80.
    #[must_use]
    pub fn host_header(&self) -> String {
        if self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// `host:port` string suitable for `TcpStream::connect`.
    #[must_use]
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 4242,
            resource: "/ws".into(),
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ws://{}:{}{}", self.host, self.port, self.resource)
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Where to connect.
    ///
    /// Default: [`DEFAULT_ENDPOINT`]
    pub endpoint: Endpoint,

    /// Resource limits for inbound data.
    pub limits: Limits,

    /// Upper bound for TCP connect plus the opening handshake.
    ///
    /// Default: 30 seconds
    pub handshake_timeout: Duration,

    /// Read buffer size (in bytes).
    ///
    /// Default: 8 KB (8192)
    pub read_buffer_size: usize,

    /// Capacity of the channel carrying transport events to the client.
    ///
    /// Default: 64
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            limits: Limits::default(),
            handshake_timeout: Duration::from_secs(30),
            read_buffer_size: 8192,
            event_capacity: 64,
        }
    }
}

impl ClientConfig {
    /// Create a configuration pointing at [`DEFAULT_ENDPOINT`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the connect and handshake timeout.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the event channel capacity. Zero is bumped to one.
    #[must_use]
    pub const fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = if capacity == 0 { 1 } else { capacity };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_default() {
        let limits = Limits::default();
        assert_eq!(limits.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(limits.max_message_size, 64 * 1024 * 1024);
        assert_eq!(limits.max_fragment_count, 128);
        assert_eq!(limits.max_handshake_size, 8192);
    }

    #[test]
    fn test_limits_checks() {
        let limits = Limits::new(10, 20, 2, 30);
        assert!(limits.check_frame_size(10).is_ok());
        assert!(matches!(
            limits.check_frame_size(11),
            Err(Error::FrameTooLarge { size: 11, max: 10 })
        ));
        assert!(limits.check_message_size(20).is_ok());
        assert!(limits.check_message_size(21).is_err());
        assert!(limits.check_fragment_count(2).is_ok());
        assert!(limits.check_fragment_count(3).is_err());
        assert!(limits.check_handshake_size(30).is_ok());
        assert!(matches!(
            limits.check_handshake_size(31),
            Err(Error::HandshakeTooLarge { .. })
        ));
    }

    #[test]
    fn test_default_endpoint_matches_constant() {
        let parsed = Endpoint::parse(DEFAULT_ENDPOINT).unwrap();
        assert_eq!(parsed, Endpoint::default());
        assert_eq!(parsed.to_string(), DEFAULT_ENDPOINT);
        assert_eq!(parsed.host_header(), "localhost:4242");
        assert_eq!(parsed.socket_addr(), "localhost:4242");
    }

    #[test]
    fn test_endpoint_defaults_port_and_path() {
        let ep: Endpoint = "ws://example.com".parse().unwrap();
        assert_eq!(ep.port(), 80);
        assert_eq!(ep.resource(), "/");
        assert_eq!(ep.host_header(), "example.com");
    }

    #[test]
    fn test_endpoint_keeps_query() {
        let ep = Endpoint::parse("ws://127.0.0.1:9000/ws?client=web").unwrap();
        assert_eq!(ep.host(), "127.0.0.1");
        assert_eq!(ep.port(), 9000);
        assert_eq!(ep.resource(), "/ws?client=web");
    }

    #[test]
    fn test_endpoint_ipv6() {
        let ep = Endpoint::parse("ws://[::1]:4242/ws").unwrap();
        assert_eq!(ep.host(), "[::1]");
        assert_eq!(ep.socket_addr(), "[::1]:4242");
    }

    #[test]
    fn test_endpoint_rejects_other_schemes() {
        assert!(matches!(
            Endpoint::parse("http://localhost:4242/ws"),
            Err(Error::InvalidEndpoint(msg)) if msg.contains("http")
        ));
        assert!(matches!(
            Endpoint::parse("wss://localhost/ws"),
            Err(Error::InvalidEndpoint(msg)) if msg.contains("wss")
        ));
        assert!(Endpoint::parse("ws://localhost/ws#frag").is_err());
        assert!(Endpoint::parse("localhost:4242").is_err());
    }

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint, Endpoint::default());
        assert_eq!(config.handshake_timeout, Duration::from_secs(30));
        assert_eq!(config.read_buffer_size, 8192);
        assert_eq!(config.event_capacity, 64);
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new()
            .with_endpoint(Endpoint::parse("ws://10.0.0.1:81/sub").unwrap())
            .with_limits(Limits::new(1024, 2048, 4, 1024))
            .with_handshake_timeout(Duration::from_millis(250))
            .with_read_buffer_size(512)
            .with_event_capacity(0);

        assert_eq!(config.endpoint.port(), 81);
        assert_eq!(config.limits.max_frame_size, 1024);
        assert_eq!(config.handshake_timeout, Duration::from_millis(250));
        assert_eq!(config.read_buffer_size, 512);
        assert_eq!(config.event_capacity, 1);
    }
}
