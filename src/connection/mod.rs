//! Client connection: opening handshake, frame I/O and close handling.
//!
//! ## Connection Lifecycle
//!
//! 1. **Connecting** - TCP connect and HTTP Upgrade in progress
//! 2. **Open** - handshake verified, messages flow
//! 3. **Closing** - close frame sent, waiting for the peer
//! 4. **Closed** - close handshake finished or stream ended
//!
//! ## Example
//!
//! ```rust,ignore
//! use wsboot::{ClientConfig, connection};
//!
//! let mut conn = connection::connect(&ClientConfig::default()).await?;
//! while let Some(msg) = conn.recv().await? {
//!     println!("Received: {:?}", msg);
//! }
//! ```

mod connect;
#[allow(clippy::module_inception)]
mod connection;
mod state;

pub use connect::{connect, handshake};
pub use connection::Connection;
pub use state::ConnectionState;
