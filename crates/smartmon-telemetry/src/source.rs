//! [`TelemetrySource`] – read-only access to predictive telemetry.

use std::collections::HashMap;

use smartmon_types::{Prediction, TelemetryCounters, TelemetryFrame, TelemetryStats};

/// A provider of per-process spike predictions and statistics.
///
/// Implementations never fail: when the backing data is absent every read
/// returns an empty result and [`available`][TelemetrySource::available]
/// reports `false`.  Callers treat that as degraded telemetry.
pub trait TelemetrySource {
    /// `true` when the backing source is present.
    fn available(&self) -> bool;

    /// Aggregate scheduler counters.
    fn read_counters(&self) -> TelemetryCounters;

    /// Spike predictions keyed by pid.
    fn read_predictions(&self) -> HashMap<u32, Prediction>;

    /// EMA / rate-of-change statistics keyed by pid.
    fn read_stats(&self) -> HashMap<u32, TelemetryStats>;

    /// Predictions and statistics for one poll.  Empty when the source is
    /// unavailable.
    fn read_frame(&self) -> TelemetryFrame {
        if !self.available() {
            return TelemetryFrame::empty();
        }
        TelemetryFrame {
            predictions: self.read_predictions(),
            stats: self.read_stats(),
        }
    }
}
