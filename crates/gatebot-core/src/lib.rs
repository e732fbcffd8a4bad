//! Core domain + application logic for the subscription-gated relay bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and Gemini live
//! behind ports (traits) implemented in adapter crates.

pub mod chunking;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod generation;
pub mod keyboard;
pub mod logging;
pub mod messaging;
pub mod subscription;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use errors::{Error, Result};
