//! # exthost-server
//!
//! WebSocket transport for the extension broker.
//!
//! - [`server::ExtHostServer`] owns the router (`/ws`, `/health`) and the listener
//! - [`websocket::session`] runs one extension channel per socket
//! - [`shutdown::ShutdownCoordinator`] fans a cancellation out to sessions

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod websocket;
