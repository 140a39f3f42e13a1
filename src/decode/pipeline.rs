//! Single-worker decode pipeline with supersession.

use super::{DecodeError, Decoder, LuminanceSource, ResultPoint};
use crate::config::DecodeConfig;
use crate::geometry::Rect;
use crate::hardware::Frame;
use crate::sync::lock;
use image::GrayImage;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Identifier of a submitted decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Numeric value; ids increase with submission order.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a decode task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Submitted, not yet picked up by the worker.
    Pending,
    /// Being decoded.
    Running,
    /// Decoded; a result or a miss was delivered.
    Completed,
    /// Superseded or cancelled; nothing more is delivered.
    Cancelled,
    /// Invalid frame or decoder panic.
    Failed,
}

impl TaskStatus {
    /// Whether the task can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// A frame to decode and the region of it to look at.
#[derive(Debug)]
pub struct DecodeRequest {
    /// Frame to decode.
    pub frame: Frame,
    /// Crop in frame coordinates; `None` decodes the whole frame.
    pub crop: Option<Rect>,
}

impl DecodeRequest {
    /// Request to decode `crop` of `frame`.
    pub fn new(frame: Frame, crop: Option<Rect>) -> Self {
        Self { frame, crop }
    }
}

/// Receives what the pipeline produces.
///
/// Progress, result, hint and miss callbacks are only made for the current,
/// uncancelled task and run while the pipeline holds its task lock: they
/// must not call back into the pipeline.
pub trait DecodeSink: Send + Sync {
    /// A renderable snapshot of the frame about to be decoded.
    fn on_progress(&self, snapshot: &GrayImage);

    /// Decoded text. Called at most once per task.
    fn on_result(&self, text: &str);

    /// A candidate point found while decoding.
    fn on_result_point(&self, point: ResultPoint) {
        let _ = point;
    }

    /// The decoder found nothing in the frame.
    fn on_miss(&self, task: TaskId) {
        let _ = task;
    }

    /// The task reached a terminal status. Called exactly once per task.
    fn on_finished(&self, task: TaskId, status: TaskStatus) {
        let _ = (task, status);
    }
}

struct DecodeTask {
    id: TaskId,
    status: Mutex<TaskStatus>,
    request: Mutex<Option<DecodeRequest>>,
}

impl DecodeTask {
    fn status(&self) -> TaskStatus {
        *lock(&self.status)
    }

    /// Marks a pending or running task cancelled. Returns true on transition.
    fn cancel(&self) -> bool {
        let mut status = lock(&self.status);
        if status.is_terminal() {
            return false;
        }
        *status = TaskStatus::Cancelled;
        lock(&self.request).take();
        true
    }

    /// Moves a running task to `outcome`. Returns false if it already left
    /// `Running`.
    fn finish(&self, outcome: TaskStatus) -> bool {
        let mut status = lock(&self.status);
        if *status != TaskStatus::Running {
            return false;
        }
        *status = outcome;
        true
    }
}

struct Shared {
    current: Mutex<Option<Arc<DecodeTask>>>,
    wake: Notify,
    next_id: AtomicU64,
    decoder: Arc<dyn Decoder>,
    sink: Arc<dyn DecodeSink>,
    config: DecodeConfig,
}

impl Shared {
    /// Takes the current task if it is still pending and marks it running.
    fn take_pending(&self) -> Option<(Arc<DecodeTask>, DecodeRequest)> {
        let current = lock(&self.current);
        let task = Arc::clone(current.as_ref()?);
        let mut status = lock(&task.status);
        if *status != TaskStatus::Pending {
            return None;
        }
        let request = lock(&task.request).take()?;
        *status = TaskStatus::Running;
        drop(status);
        Some((task, request))
    }

    /// Runs `f` against the sink if `task` is still current and not
    /// cancelled.
    fn deliver(
        &self,
        task: &DecodeTask,
        f: impl FnOnce(&dyn DecodeSink),
    ) -> Result<(), DecodeError> {
        let current = lock(&self.current);
        let is_current = current.as_ref().is_some_and(|c| c.id == task.id);
        if !is_current || task.status() == TaskStatus::Cancelled {
            return Err(DecodeError::Cancelled);
        }
        f(self.sink.as_ref());
        Ok(())
    }

    /// Like [`Shared::deliver`], but also completes the task before the
    /// task lock is released, so a racing `submit` cannot cancel it.
    fn deliver_final(
        &self,
        task: &DecodeTask,
        f: impl FnOnce(&dyn DecodeSink),
    ) -> Result<(), DecodeError> {
        let current = lock(&self.current);
        let is_current = current.as_ref().is_some_and(|c| c.id == task.id);
        let mut status = lock(&task.status);
        if !is_current || *status != TaskStatus::Running {
            return Err(DecodeError::Cancelled);
        }
        f(self.sink.as_ref());
        *status = TaskStatus::Completed;
        Ok(())
    }

    fn report(&self, task: TaskId, status: TaskStatus) {
        self.sink.on_finished(task, status);
    }
}

/// Decodes one frame at a time, newest first.
///
/// Submitting a frame cancels whatever the pipeline was doing with the
/// previous one. A single worker task drives decoding on the blocking pool,
/// so the decoder is never invoked concurrently.
pub struct DecodePipeline {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    worker: JoinHandle<()>,
}

impl DecodePipeline {
    /// Creates the pipeline and spawns its worker on `runtime`.
    pub fn new(
        decoder: Arc<dyn Decoder>,
        sink: Arc<dyn DecodeSink>,
        config: DecodeConfig,
        runtime: &Handle,
    ) -> Self {
        let shared = Arc::new(Shared {
            current: Mutex::new(None),
            wake: Notify::new(),
            next_id: AtomicU64::new(1),
            decoder,
            sink,
            config,
        });
        let shutdown = CancellationToken::new();
        let worker = runtime.spawn(run_worker(Arc::clone(&shared), shutdown.clone()));
        Self {
            shared,
            shutdown,
            worker,
        }
    }

    /// Queues `request`, cancelling the previous task. Never blocks on a
    /// running decode.
    pub fn submit(&self, request: DecodeRequest) -> TaskId {
        let id = TaskId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let task = Arc::new(DecodeTask {
            id,
            status: Mutex::new(TaskStatus::Pending),
            request: Mutex::new(Some(request)),
        });

        let superseded = {
            let mut current = lock(&self.shared.current);
            let previous = current.replace(task);
            previous.filter(|p| p.cancel()).map(|p| p.id)
        };
        if let Some(previous) = superseded {
            tracing::debug!(%previous, next = %id, "decode superseded");
            self.shared.report(previous, TaskStatus::Cancelled);
        }

        self.shared.wake.notify_one();
        tracing::trace!(task = %id, "decode submitted");
        id
    }

    /// Cancels the current task, if any is pending or running.
    pub fn cancel(&self) -> Option<TaskId> {
        let cancelled = {
            let current = lock(&self.shared.current);
            current.as_ref().filter(|t| t.cancel()).map(|t| t.id)
        };
        if let Some(task) = cancelled {
            tracing::debug!(%task, "decode cancelled");
            self.shared.report(task, TaskStatus::Cancelled);
        }
        cancelled
    }

    /// Id and status of the most recently submitted task.
    pub fn current(&self) -> Option<(TaskId, TaskStatus)> {
        lock(&self.shared.current)
            .as_ref()
            .map(|t| (t.id, t.status()))
    }

    /// Cancels the current task and stops the worker.
    ///
    /// A decode already running on the blocking pool finishes, but nothing
    /// it produces is delivered.
    pub fn shutdown(&self) {
        self.cancel();
        self.shutdown.cancel();
    }

    /// Returns true once the worker task has exited.
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }
}

impl Drop for DecodePipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_worker(shared: Arc<Shared>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = shared.wake.notified() => {}
        }

        let Some((task, request)) = shared.take_pending() else {
            continue;
        };
        let id = task.id;
        tracing::trace!(task = %id, sequence = request.frame.sequence(), "decode started");

        let job_shared = Arc::clone(&shared);
        let job_task = Arc::clone(&task);
        let joined =
            tokio::task::spawn_blocking(move || decode(&job_shared, &job_task, request)).await;

        let outcome = match joined {
            Ok(Ok(())) => TaskStatus::Completed,
            Ok(Err(DecodeError::Cancelled)) => TaskStatus::Cancelled,
            Ok(Err(e)) => {
                tracing::warn!(task = %id, error = %e, "decode failed");
                TaskStatus::Failed
            }
            Err(e) => {
                tracing::warn!(task = %id, error = %e, "decode task panicked");
                TaskStatus::Failed
            }
        };
        // A successful decode completed the task during its final delivery.
        if outcome == TaskStatus::Completed || task.finish(outcome) {
            shared.report(id, outcome);
        }
    }
    tracing::debug!("decode worker stopped");
}

fn decode(shared: &Shared, task: &DecodeTask, request: DecodeRequest) -> Result<(), DecodeError> {
    let frame = &request.frame;
    let crop = request
        .crop
        .unwrap_or_else(|| Rect::new(0, 0, frame.width(), frame.height()));
    let source = LuminanceSource::new(frame.pixels(), frame.width(), frame.height(), crop)?;

    if shared.config.preview_snapshots {
        let snapshot = source.snapshot(shared.config.snapshot_rotation);
        shared.deliver(task, |sink| sink.on_progress(&snapshot))?;
    }

    let mut hints = |point: ResultPoint| {
        let _ = shared.deliver(task, |sink| sink.on_result_point(point));
    };
    let text = shared.decoder.decode_with_hints(&source, &mut hints);

    match text {
        Some(text) => {
            shared.deliver_final(task, |sink| sink.on_result(&text))?;
            tracing::info!(task = %task.id, len = text.len(), "code decoded");
        }
        None => {
            shared.deliver_final(task, |sink| sink.on_miss(task.id))?;
            tracing::debug!(task = %task.id, "no code found");
        }
    }
    Ok(())
}
