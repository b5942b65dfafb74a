//! shuttle: move one file between a client and a daemon over TCP,
//! verified end-to-end with MD5.
//!
//! Control messages travel as length-prefixed bincode frames; file bodies
//! travel raw on the same socket.

pub mod checksum;
pub mod cli;
pub mod client;
pub mod config;
pub mod conn;
pub mod disk;
pub mod error;
pub mod journal;
pub mod logger;
pub mod partial;
pub mod progress;
pub mod protocol;
pub mod protocol_core;
pub mod server;
pub mod url;

pub use error::TransferError;
