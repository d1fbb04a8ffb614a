//! Domain Layer - Core feed types and business logic.
//!
//! Instrument identity, the sticky quote merge and subscription tracking.
//! Nothing in this layer knows about WebSockets or wire formats.

/// Instrument identity and directory.
pub mod instrument;

/// Partial quote updates and the merged per-instrument views.
pub mod quote;

/// Feed modes, categories, events and connection state.
pub mod streaming;

/// Subscription registry.
pub mod subscription;
