//! Application Layer - Ports and services.
//!
//! Defines what the feed engine needs from its surroundings and how merged
//! events reach subscriber code.

/// Port interfaces (session source, subscriber callbacks).
pub mod ports;

/// Event dispatch and message logs.
pub mod services;
