//! WebSocket connection lifecycle.

pub mod connection;
pub mod frame;
pub mod handler;
pub mod lifecycle;
pub mod origin;
pub mod read_loop;
pub mod registry;
pub mod upgrade;
pub mod write_loop;

#[cfg(test)]
pub(crate) mod testing;
