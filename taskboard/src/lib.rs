//! Task board client library.
//!
//! Provides the reconciler that folds server events into a local
//! [`reconcile::BoardView`], the WebSocket session that keeps it live, the
//! layered configuration, and text rendering for the terminal.

pub mod client;
pub mod config;
pub mod reconcile;
pub mod render;
