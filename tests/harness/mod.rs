//! Test harness utilities for end-to-end client tests.
//!
//! Provides a scripted loopback server that speaks the same handshake and
//! framing as the production session server.

mod server;

pub use server::{Reply, Step, TestServer, session_frame};
