//! Configuration Module
//!
//! Environment-driven configuration for the feed binary.

mod settings;

pub use settings::{ConfigError, ConnectionSettings, FeedConfig};
