//! Core domain + application logic for the anti-scam room bot.
//!
//! This crate is intentionally transport-agnostic. The chat server and the
//! settings export endpoint live behind ports (traits) implemented in adapter
//! crates.

pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod handler;
pub mod logging;
pub mod patterns;
pub mod policy;
pub mod refresh;
pub mod settings;
pub mod sync;
pub mod transport;

pub use errors::{Error, Result};

#[cfg(test)]
pub(crate) mod testing;
