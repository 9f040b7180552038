//! # roly-server
//!
//! Persistent WebSocket connection manager on Axum.
//!
//! Each accepted upgrade becomes a [`websocket::connection::Connection`]
//! driven by two independent tasks: a read loop that dispatches inbound text
//! frames to a [`websocket::handler::MessageHandler`], and a write loop that
//! drains the bounded outbound queue. Whichever side stops first (peer close,
//! idle deadline, write failure, or server shutdown) runs the connection's
//! cleanup, which executes exactly once.

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;
