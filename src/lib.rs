//! # wsboot - session bootstrap over WebSocket
//!
//! `wsboot` opens a single WebSocket connection, logs its lifecycle, and
//! captures the session id the server sends in its first message.
//!
//! ## Features
//!
//! - **RFC 6455 client transport** with strict frame validation and limits
//! - **Event-driven client** fed by a channel, drivable with synthetic events
//! - **Pluggable diagnostics** through the [`Observer`] trait
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wsboot::{ClientConfig, bootstrap};
//!
//! # async fn demo() {
//! match bootstrap(ClientConfig::default()).await {
//!     Some(id) => println!("session: {id}"),
//!     None => eprintln!("no session acquired"),
//! }
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod protocol;
pub mod transport;

pub use client::{
    LogEntry, Observer, Payload, Phase, SessionBootstrapClient, TracingObserver, TransportEvent,
};
pub use codec::WebSocketCodec;
pub use config::{ClientConfig, DEFAULT_ENDPOINT, Endpoint, Limits};
pub use connection::{Connection, ConnectionState};
pub use error::{Error, Result};
pub use message::{CloseCode, CloseFrame, Message};

/// Connect with `config`, follow the connection until it closes and return
/// the acquired session id.
///
/// Connection failures are logged, not returned; they show up as `None`.
pub async fn bootstrap(config: ClientConfig) -> Option<String> {
    let mut client = SessionBootstrapClient::connect(config);
    client.run().await.map(str::to_owned)
}
