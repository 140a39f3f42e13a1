use crate::decode::TaskStatus;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing what a session has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Focus passes that reported success.
    pub focus_successes: u64,
    /// Focus passes that reported failure.
    pub focus_failures: u64,
    /// Frames delivered by one-shot registrations, stale ones included.
    pub frames_captured: u64,
    /// Frames handed to the decode pipeline.
    pub decodes_submitted: u64,
    /// Decode tasks superseded or cancelled.
    pub decodes_cancelled: u64,
    /// Decode tasks that produced a result or a miss.
    pub decodes_completed: u64,
    /// Decode tasks that failed.
    pub decodes_failed: u64,
    /// Decoded results delivered to the renderer.
    pub results: u64,
    /// Decodes that found nothing.
    pub misses: u64,
}

#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    focus_successes: AtomicU64,
    focus_failures: AtomicU64,
    frames_captured: AtomicU64,
    decodes_submitted: AtomicU64,
    decodes_cancelled: AtomicU64,
    decodes_completed: AtomicU64,
    decodes_failed: AtomicU64,
    results: AtomicU64,
    misses: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl SessionCounters {
    pub(crate) fn focus(&self, success: bool) {
        if success {
            bump(&self.focus_successes);
        } else {
            bump(&self.focus_failures);
        }
    }

    pub(crate) fn frame_captured(&self) {
        bump(&self.frames_captured);
    }

    pub(crate) fn decode_submitted(&self) {
        bump(&self.decodes_submitted);
    }

    pub(crate) fn decode_finished(&self, status: TaskStatus) {
        match status {
            TaskStatus::Completed => bump(&self.decodes_completed),
            TaskStatus::Cancelled => bump(&self.decodes_cancelled),
            TaskStatus::Failed => bump(&self.decodes_failed),
            TaskStatus::Pending | TaskStatus::Running => {}
        }
    }

    pub(crate) fn result(&self) {
        bump(&self.results);
    }

    pub(crate) fn miss(&self) {
        bump(&self.misses);
    }

    pub(crate) fn snapshot(&self) -> SessionStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        SessionStats {
            focus_successes: get(&self.focus_successes),
            focus_failures: get(&self.focus_failures),
            frames_captured: get(&self.frames_captured),
            decodes_submitted: get(&self.decodes_submitted),
            decodes_cancelled: get(&self.decodes_cancelled),
            decodes_completed: get(&self.decodes_completed),
            decodes_failed: get(&self.decodes_failed),
            results: get(&self.results),
            misses: get(&self.misses),
        }
    }
}
