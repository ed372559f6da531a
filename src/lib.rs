//! # Lotsync Library
//!
//! Core functionality for the lotsync inventory synchronization service:
//! the feed client and transformer, the sweep supervisor, the archival
//! lifecycle manager, and the HTTP surface that triggers them.

pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod server;
pub mod sync;
pub mod telemetry;
pub use migration;
