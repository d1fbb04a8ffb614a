//! Infrastructure Layer - Adapters and external integrations.
//!
//! The venue connection and everything the binary needs around it.

/// Alice Blue feed adapters (codecs, protocol, connection manager).
pub mod aliceblue;

/// Environment configuration.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber and OpenTelemetry export.
pub mod telemetry;
