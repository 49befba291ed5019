//! Provider side of the interactive market data protocol.
//!
//! A `Server` accepts client channels and runs one `Session` per channel. Each session drives
//! the channel handshake, supervises liveness with pings and routes decoded messages by domain
//! to the login, source directory and dictionary handlers.
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

pub mod prelude;

pub mod codec;
pub mod config;
pub mod dictionary;
pub mod dispatch;
pub mod handler;
pub mod init;
pub mod net;
pub mod ping;
pub mod rdm;
pub mod server;
pub mod session;
pub mod transport;
pub mod writer;

#[cfg(test)]
pub(crate) mod mock;
