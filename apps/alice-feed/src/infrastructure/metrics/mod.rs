//! Prometheus Metrics Module
//!
//! Feed health in Prometheus format.
//!
//! # Metrics
//!
//! | Name                                     | Kind      | Labels     |
//! |------------------------------------------|-----------|------------|
//! | `alice_feed_frames_received_total`       | counter   | `category` |
//! | `alice_feed_frames_dropped_total`        | counter   | `reason`   |
//! | `alice_feed_reconnects_total`            | counter   |            |
//! | `alice_feed_connected`                   | gauge     |            |
//! | `alice_feed_subscriptions`               | gauge     |            |
//! | `alice_feed_frame_processing_seconds`    | histogram |            |
//!
//! Recording before [`init_metrics`] is a no-op.

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::streaming::FeedCategory;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder.
///
/// With `listen` set, the exporter serves `/metrics` on that address itself;
/// otherwise the rendered text is available through [`render_metrics`].
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// cannot be bound.
pub fn init_metrics(listen: Option<SocketAddr>) -> Result<(), BuildError> {
    match listen {
        Some(addr) => {
            PrometheusBuilder::new().with_http_listener(addr).install()?;
            tracing::info!(%addr, "Prometheus exporter listening");
        }
        None => {
            let handle = PrometheusBuilder::new().install_recorder()?;
            let _ = PROMETHEUS_HANDLE.set(handle);
        }
    }
    register_metrics();
    Ok(())
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` unless metrics were installed without a listener.
#[must_use]
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render)
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "alice_feed_frames_received_total",
        "Frames decoded from the feed by category"
    );
    describe_counter!(
        "alice_feed_frames_dropped_total",
        "Frames dropped by the decoder by reason"
    );
    describe_counter!(
        "alice_feed_reconnects_total",
        "Reconnection attempts after a transport failure"
    );
    describe_gauge!(
        "alice_feed_connected",
        "Whether the feed connection is open (1) or not (0)"
    );
    describe_gauge!(
        "alice_feed_subscriptions",
        "Instruments in the subscription registry"
    );
    describe_histogram!(
        "alice_feed_frame_processing_seconds",
        "Time from frame receipt to callback return"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Why a frame was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Exchange and token are not in the directory.
    UnknownInstrument,
    /// Frame could not be decoded.
    Malformed,
    /// Binary mode the venue no longer sends.
    DeprecatedMode,
}

impl DropReason {
    /// Get the label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownInstrument => "unknown_instrument",
            Self::Malformed => "malformed",
            Self::DeprecatedMode => "deprecated_mode",
        }
    }
}

/// Record a decoded frame.
pub fn record_frame(category: FeedCategory) {
    counter!(
        "alice_feed_frames_received_total",
        "category" => category.as_str()
    )
    .increment(1);
}

/// Record a dropped frame.
pub fn record_frame_dropped(reason: DropReason) {
    counter!(
        "alice_feed_frames_dropped_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("alice_feed_reconnects_total").increment(1);
}

/// Update the connection gauge.
pub fn set_connected(connected: bool) {
    gauge!("alice_feed_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Update the subscription gauge.
pub fn set_subscriptions(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("alice_feed_subscriptions").set(count as f64);
}

/// Record frame processing duration.
pub fn record_processing_duration(duration: Duration) {
    histogram!("alice_feed_frame_processing_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_reason_labels() {
        assert_eq!(DropReason::UnknownInstrument.as_str(), "unknown_instrument");
        assert_eq!(DropReason::Malformed.as_str(), "malformed");
        assert_eq!(DropReason::DeprecatedMode.as_str(), "deprecated_mode");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_frame(FeedCategory::Tick);
        record_frame_dropped(DropReason::Malformed);
        record_reconnect();
        set_connected(true);
        set_subscriptions(3);
        record_processing_duration(Duration::from_micros(40));
    }
}
