//! Task board server library.
//!
//! Exposes the board server for use in tests and embedding. The server
//! accepts WebSocket connections, sends each a snapshot of the board, and
//! broadcasts every accepted mutation to all connected clients.

pub mod config;
pub mod error;
pub mod hub;
pub mod server;
pub mod store;
