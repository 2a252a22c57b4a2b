//! revchain: ordered schema-migration chains for SQLite.
//!
//! The chain logic, stores and executor live in `revchain-core`; this crate
//! adds configuration, locked CLI runs and a read-only status API.

pub mod api;
pub mod config;
pub mod runner;
