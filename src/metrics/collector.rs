//! Metrics collection and registry.

use crate::session::{SessionState, SessionStats};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of session state for metrics update.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Current session state, `None` before the session exists.
    pub state: Option<SessionState>,
    /// Session counters.
    pub stats: SessionStats,
}

impl MetricsSnapshot {
    /// Creates a snapshot from a running session.
    pub fn from_session(session: &crate::session::CameraSession) -> Self {
        Self {
            state: Some(session.state()),
            stats: session.stats(),
        }
    }
}

fn state_code(state: Option<SessionState>) -> i64 {
    match state {
        None | Some(SessionState::Closed) => 0,
        Some(SessionState::Opening) => 1,
        Some(SessionState::Previewing) => 2,
        Some(SessionState::Paused) => 3,
    }
}

/// Raises `counter` to `target`. Counters never go down.
fn advance(counter: &IntCounter, target: u64) {
    let current = counter.get();
    if target > current {
        counter.inc_by(target - current);
    }
}

/// Prometheus metrics registry for a scanning session.
pub struct MetricsRegistry {
    registry: Registry,

    session_state: IntGauge,

    focus_completions: IntCounter,
    focus_failures: IntCounter,
    frames_captured: IntCounter,

    decodes_submitted: IntCounter,
    decodes_cancelled: IntCounter,
    decodes_completed: IntCounter,
    decodes_failed: IntCounter,

    results: IntCounter,
    misses: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all session metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let session_state = IntGauge::new(
            "camera_scan_session_state",
            "Session state (0=closed, 1=opening, 2=previewing, 3=paused)",
        )?;

        let focus_completions = IntCounter::new(
            "camera_scan_focus_completions_total",
            "Auto-focus passes that reported success",
        )?;
        let focus_failures = IntCounter::new(
            "camera_scan_focus_failures_total",
            "Auto-focus passes that reported failure",
        )?;
        let frames_captured = IntCounter::new(
            "camera_scan_frames_captured_total",
            "One-shot frames delivered by the camera",
        )?;

        let decodes_submitted = IntCounter::new(
            "camera_scan_decodes_submitted_total",
            "Frames submitted to the decode pipeline",
        )?;
        let decodes_cancelled = IntCounter::new(
            "camera_scan_decodes_cancelled_total",
            "Decodes cancelled by a newer frame or by pause",
        )?;
        let decodes_completed = IntCounter::new(
            "camera_scan_decodes_completed_total",
            "Decodes that ran to completion",
        )?;
        let decodes_failed = IntCounter::new(
            "camera_scan_decodes_failed_total",
            "Decodes that failed on an invalid frame or decoder error",
        )?;

        let results = IntCounter::new("camera_scan_results_total", "Codes decoded")?;
        let misses = IntCounter::new(
            "camera_scan_misses_total",
            "Completed decodes that found no code",
        )?;

        registry.register(Box::new(session_state.clone()))?;
        registry.register(Box::new(focus_completions.clone()))?;
        registry.register(Box::new(focus_failures.clone()))?;
        registry.register(Box::new(frames_captured.clone()))?;
        registry.register(Box::new(decodes_submitted.clone()))?;
        registry.register(Box::new(decodes_cancelled.clone()))?;
        registry.register(Box::new(decodes_completed.clone()))?;
        registry.register(Box::new(decodes_failed.clone()))?;
        registry.register(Box::new(results.clone()))?;
        registry.register(Box::new(misses.clone()))?;

        Ok(Self {
            registry,
            session_state,
            focus_completions,
            focus_failures,
            frames_captured,
            decodes_submitted,
            decodes_cancelled,
            decodes_completed,
            decodes_failed,
            results,
            misses,
        })
    }

    /// Updates all metrics from a snapshot.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        let stats = &snapshot.stats;
        self.session_state.set(state_code(snapshot.state));

        advance(&self.focus_completions, stats.focus_successes);
        advance(&self.focus_failures, stats.focus_failures);
        advance(&self.frames_captured, stats.frames_captured);

        advance(&self.decodes_submitted, stats.decodes_submitted);
        advance(&self.decodes_cancelled, stats.decodes_cancelled);
        advance(&self.decodes_completed, stats.decodes_completed);
        advance(&self.decodes_failed, stats.decodes_failed);

        advance(&self.results, stats.results);
        advance(&self.misses, stats.misses);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        assert!(MetricsRegistry::new().is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();
        let snapshot = MetricsSnapshot {
            state: Some(SessionState::Previewing),
            stats: SessionStats {
                focus_successes: 4,
                frames_captured: 3,
                decodes_submitted: 3,
                decodes_cancelled: 1,
                decodes_completed: 2,
                results: 1,
                misses: 1,
                ..Default::default()
            },
        };

        registry.update(&snapshot);

        let output = registry.encode().unwrap();
        assert!(output.contains("camera_scan_session_state 2"));
        assert!(output.contains("camera_scan_focus_completions_total 4"));
        assert!(output.contains("camera_scan_decodes_cancelled_total 1"));
        assert!(output.contains("camera_scan_results_total 1"));
    }

    #[test]
    fn test_counters_never_decrease() {
        let registry = MetricsRegistry::new().unwrap();
        let mut snapshot = MetricsSnapshot::default();
        snapshot.stats.results = 5;
        registry.update(&snapshot);

        snapshot.stats.results = 2;
        registry.update(&snapshot);

        assert!(registry.encode().unwrap().contains("camera_scan_results_total 5"));
    }

    #[test]
    fn test_metrics_encode() {
        let registry = MetricsRegistry::new().unwrap();
        let output = registry.encode().unwrap();

        assert!(output.contains("camera_scan_session_state 0"));
        assert!(output.contains("camera_scan_decodes_submitted_total"));
        assert!(output.contains("camera_scan_misses_total"));
    }
}
