//! One-shot and periodic auto-focus requests.

use crate::hardware::{FocusCallback, FocusMode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Errors returned by the focus scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FocusError {
    /// The requested period is shorter than the configured minimum.
    #[error("focus period {requested_ms}ms is below the minimum of {minimum_ms}ms")]
    InvalidPeriod {
        /// Requested period.
        requested_ms: u64,
        /// Shortest period accepted.
        minimum_ms: u64,
    },
}

/// The part of a camera device the scheduler is allowed to touch.
pub trait FocusControl: Send + Sync {
    /// Focus mode of the device, or `None` if no device is open.
    fn focus_mode(&self) -> Option<FocusMode>;

    /// Starts a focus pass. Returns false if no device is open.
    fn request_auto_focus(&self, callback: FocusCallback) -> bool;
}

/// Receives every focus completion with its success flag.
pub type FocusListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusState {
    /// No periodic timer.
    Idle,
    /// Focusing every `period`.
    Scheduled {
        /// Interval between focus requests.
        period: Duration,
    },
}

/// Drives auto-focus against a [`FocusControl`].
///
/// Owns at most one repeating timer. Starting a new period cancels the old
/// timer first; stopping or dropping the scheduler cancels it too.
pub struct FocusScheduler {
    control: Arc<dyn FocusControl>,
    listener: FocusListener,
    enabled: bool,
    min_period: Duration,
    period: Duration,
    timer: Option<CancellationToken>,
    runtime: Handle,
}

impl FocusScheduler {
    /// Creates a scheduler bound to a device and a completion listener.
    ///
    /// Periodic focus is enabled only if the device is in auto or macro
    /// focus mode at construction.
    pub fn new(
        control: Arc<dyn FocusControl>,
        listener: FocusListener,
        min_period: Duration,
        runtime: Handle,
    ) -> Self {
        let mode = control.focus_mode();
        let enabled = mode.is_some_and(|m| m.supports_auto_focus());
        tracing::debug!(?mode, enabled, "focus scheduler created");
        Self {
            control,
            listener,
            enabled,
            min_period,
            period: Duration::ZERO,
            timer: None,
            runtime,
        }
    }

    /// Whether periodic focus can run on this device.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current state.
    pub fn state(&self) -> FocusState {
        if self.timer.is_some() && !self.period.is_zero() {
            FocusState::Scheduled {
                period: self.period,
            }
        } else {
            FocusState::Idle
        }
    }

    /// Issues a single focus request. Does not affect periodic focus.
    pub fn request_once(&self) {
        issue(self.control.as_ref(), &self.listener);
    }

    /// Starts periodic focus.
    ///
    /// Issues a request immediately and then every `period` until stopped.
    /// Returns `Ok(false)` without doing anything if the device does not
    /// support auto-focus.
    pub fn start_periodic(&mut self, period: Duration) -> Result<bool, FocusError> {
        if period < self.min_period {
            return Err(FocusError::InvalidPeriod {
                requested_ms: period.as_millis() as u64,
                minimum_ms: self.min_period.as_millis() as u64,
            });
        }
        if !self.enabled {
            tracing::debug!("periodic focus unsupported by device, ignoring");
            return Ok(false);
        }

        self.cancel_timer();
        self.period = period;
        self.request_once();

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let control = Arc::clone(&self.control);
        let listener = Arc::clone(&self.listener);
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => issue(control.as_ref(), &listener),
                }
            }
            tracing::trace!("periodic focus timer finished");
        });
        self.timer = Some(token);

        tracing::info!(period_ms = period.as_millis() as u64, "periodic focus started");
        Ok(true)
    }

    /// Stops periodic focus. Idempotent.
    pub fn stop(&mut self) {
        if self.timer.is_some() {
            tracing::info!("periodic focus stopped");
        }
        self.cancel_timer();
        self.period = Duration::ZERO;
    }

    fn cancel_timer(&mut self) {
        if let Some(token) = self.timer.take() {
            token.cancel();
        }
    }
}

impl Drop for FocusScheduler {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

impl std::fmt::Debug for FocusScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusScheduler")
            .field("enabled", &self.enabled)
            .field("state", &self.state())
            .finish()
    }
}

fn issue(control: &dyn FocusControl, listener: &FocusListener) {
    let listener = Arc::clone(listener);
    if !control.request_auto_focus(Box::new(move |success| listener(success))) {
        tracing::debug!("focus request dropped, device closed");
    }
}
