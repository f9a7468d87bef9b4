//! Upload session controller.
//!
//! Owns the file queue of one session, dispatches chunk transfers up to the
//! concurrency cap, and turns transport results into queue state and
//! [`UploadEvent`]s.
//!
//! All queue mutations happen under a single lock; chunk transfers run as
//! spawned tasks and report back under the same lock. Each dispatch
//! carries an attempt number, so a result for a chunk that was aborted or
//! re-dispatched in the meantime is dropped instead of applied.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use groupbin_protocol::SessionParams;
use groupbin_transfer::{
    AckOutcome, ChunkJob, FileId, FileSnapshot, FileState, ProgressThrottle, SelectedFile,
    SessionCounts, SpeedCalculator, UploadSession,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::UploadError;
use crate::transport::{ChunkRequest, ChunkTransport};
use crate::types::{UploadConfig, UploadEvent};

/// Why a controller could not be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnsupportedReason {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("transport cannot carry chunked uploads: {0}")]
    Transport(String),

    #[error("no async runtime available")]
    NoRuntime,
}

/// Outcome of the capability check.
#[derive(Debug)]
pub enum Capability {
    Supported(UploadController),
    Unsupported(UnsupportedReason),
}

impl Capability {
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Supported(_))
    }

    pub fn into_controller(self) -> Result<UploadController, UnsupportedReason> {
        match self {
            Self::Supported(controller) => Ok(controller),
            Self::Unsupported(reason) => Err(reason),
        }
    }
}

type ChunkKey = (FileId, usize);

/// How a chunk came to be acknowledged.
#[derive(Debug, Clone, Copy)]
enum ChunkOutcome {
    Sent,
    AlreadyPresent,
}

struct Transfer {
    attempt: u64,
    cancel: CancellationToken,
}

struct State {
    session: UploadSession,
    params: SessionParams,
    in_flight: HashMap<ChunkKey, Transfer>,
    next_attempt: u64,
    running: bool,
    complete_sent: bool,
    throttle: ProgressThrottle,
}

struct Shared {
    session_id: String,
    config: UploadConfig,
    transport: Arc<dyn ChunkTransport>,
    runtime: Handle,
    state: Mutex<State>,
    events_tx: mpsc::UnboundedSender<UploadEvent>,
    speed: SpeedCalculator,
    shutdown: CancellationToken,
}

/// Client-side controller of one resumable upload session.
///
/// Dropping the controller aborts every transfer still in flight.
pub struct UploadController {
    shared: Arc<Shared>,
    events_rx: Option<mpsc::UnboundedReceiver<UploadEvent>>,
}

impl fmt::Debug for UploadController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadController")
            .field("session_id", &self.shared.session_id)
            .field("mode", &self.shared.config.mode)
            .finish_non_exhaustive()
    }
}

impl UploadController {
    /// Builds a controller if this environment can run chunked uploads.
    ///
    /// Must be called from within a tokio runtime: transfers are spawned on
    /// the runtime current at this point.
    pub fn probe(config: UploadConfig, transport: Arc<dyn ChunkTransport>) -> Capability {
        if let Err(e) = config.validate() {
            return Capability::Unsupported(UnsupportedReason::InvalidConfig(e.to_string()));
        }
        if let Err(reason) = transport.check_support() {
            return Capability::Unsupported(UnsupportedReason::Transport(reason));
        }
        let Ok(runtime) = Handle::try_current() else {
            return Capability::Unsupported(UnsupportedReason::NoRuntime);
        };
        Capability::Supported(Self::new(config, transport, runtime))
    }

    fn new(config: UploadConfig, transport: Arc<dyn ChunkTransport>, runtime: Handle) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session_id = uuid::Uuid::new_v4().to_string();
        debug!(
            session = %session_id,
            chunk_size = config.chunk_size,
            max_concurrent = config.max_concurrent,
            "upload session created"
        );

        let state = State {
            session: UploadSession::new(config.chunk_size),
            params: config.params.clone(),
            in_flight: HashMap::new(),
            next_attempt: 0,
            running: false,
            complete_sent: false,
            throttle: ProgressThrottle::new(config.progress_interval),
        };
        Self {
            shared: Arc::new(Shared {
                session_id,
                config,
                transport,
                runtime,
                state: Mutex::new(state),
                events_tx,
                speed: SpeedCalculator::default(),
                shutdown: CancellationToken::new(),
            }),
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<UploadEvent>> {
        self.events_rx.take()
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn config(&self) -> &UploadConfig {
        &self.shared.config
    }

    /// Adds a file to the queue.
    ///
    /// A file added during a run joins it: its chunks are dispatched as
    /// slots free up. The new bytes lower the aggregate fraction.
    pub fn enqueue(&self, file: SelectedFile) -> Result<FileId, UploadError> {
        let mut state = self.shared.lock();
        let id = state.session.enqueue(file)?;
        state.complete_sent = false;

        if let Some(file) = state.session.file(&id) {
            debug!(
                file_id = %id,
                name = file.name(),
                size = file.size(),
                chunks = file.chunks().len(),
                "file queued"
            );
            self.shared.emit(UploadEvent::FileAdded {
                file: file.snapshot(),
            });
        }
        if state.running {
            self.shared.pump(&mut state);
        }
        Ok(id)
    }

    /// Drops a file, aborting its in-flight transfers.
    ///
    /// Freed slots are handed to the next pending chunks before this
    /// returns.
    pub fn remove(&self, id: &FileId) -> Result<(), UploadError> {
        let mut state = self.shared.lock();
        let aborted = Shared::abort_transfers(&mut state, id);
        let removed = state.session.remove(id)?;
        debug!(file_id = %id, aborted, "file removed");

        self.shared.emit(UploadEvent::FileRemoved {
            file: removed.snapshot(),
        });
        self.shared.pump(&mut state);
        Ok(())
    }

    /// Removes every file that has not completed. Returns how many were
    /// removed.
    pub fn clear(&self) -> usize {
        let mut state = self.shared.lock();
        let ids: Vec<FileId> = state
            .session
            .files()
            .iter()
            .filter(|f| f.state() != FileState::Completed)
            .map(|f| f.id().clone())
            .collect();

        let mut removed = 0;
        for id in &ids {
            Shared::abort_transfers(&mut state, id);
            match state.session.remove(id) {
                Ok(file) => {
                    self.shared.emit(UploadEvent::FileRemoved {
                        file: file.snapshot(),
                    });
                    removed += 1;
                }
                Err(e) => warn!(file_id = %id, error = %e, "could not clear file"),
            }
        }
        debug!(removed, "queue cleared");
        self.shared.pump(&mut state);
        removed
    }

    /// Begins (or resumes) dispatching chunks.
    ///
    /// Failed chunks of files that have not failed go back to pending, so
    /// calling this after an `Idle` event retries exactly the chunks that
    /// were not acknowledged.
    pub fn start(&self) -> Result<(), UploadError> {
        let mut state = self.shared.lock();
        if state.session.is_empty() {
            return Err(UploadError::EmptyQueue);
        }
        let reset = state.session.retry_failed();
        state.running = true;
        info!(
            session = %self.shared.session_id,
            files = state.session.len(),
            reset,
            "upload started"
        );
        self.shared.pump(&mut state);
        Ok(())
    }

    /// Marks a file failed and aborts its in-flight transfers.
    pub fn cancel(&self, id: &FileId) -> Result<(), UploadError> {
        let mut state = self.shared.lock();
        state.session.fail_file(id, "cancelled")?;
        let aborted = Shared::abort_transfers(&mut state, id);
        info!(file_id = %id, aborted, "file cancelled");

        if let Some(file) = state.session.file(id) {
            self.shared.emit(UploadEvent::FileError {
                file: file.snapshot(),
                chunk: None,
                reason: "cancelled".into(),
            });
        }
        self.shared.pump(&mut state);
        Ok(())
    }

    /// Replaces the form parameters sent with chunks dispatched from now on.
    pub fn set_params(&self, params: SessionParams) {
        self.shared.lock().params = params;
    }

    /// Aggregate fraction of queued bytes acknowledged, in [0, 1].
    pub fn progress(&self) -> f64 {
        self.shared.lock().session.progress()
    }

    pub fn files(&self) -> Vec<FileSnapshot> {
        let state = self.shared.lock();
        state.session.files().iter().map(|f| f.snapshot()).collect()
    }

    pub fn file(&self, id: &FileId) -> Option<FileSnapshot> {
        self.shared.lock().session.file(id).map(|f| f.snapshot())
    }

    pub fn counts(&self) -> SessionCounts {
        self.shared.lock().session.counts()
    }

    /// Number of chunk transfers currently in flight.
    pub fn in_flight(&self) -> usize {
        self.shared.lock().in_flight.len()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Current transfer rate over the recent window, in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        self.shared.speed.bytes_per_second()
    }
}

impl Drop for UploadController {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: UploadEvent) {
        if self.events_tx.send(event).is_err() {
            trace!("event receiver dropped");
        }
    }

    /// Cancels every in-flight transfer of a file, frees its slots and puts
    /// the aborted chunks back to pending.
    fn abort_transfers(state: &mut State, id: &FileId) -> usize {
        let keys: Vec<ChunkKey> = state
            .in_flight
            .keys()
            .filter(|(file_id, _)| file_id == id)
            .cloned()
            .collect();
        for key in &keys {
            if let Some(transfer) = state.in_flight.remove(key) {
                transfer.cancel.cancel();
            }
            if let Err(e) = state.session.release_chunk(id, key.1) {
                trace!(file_id = %id, chunk = key.1, error = %e, "aborted chunk not released");
            }
        }
        keys.len()
    }

    /// Fills free slots with pending chunks, then checks whether the run
    /// is over.
    fn pump(self: &Arc<Self>, state: &mut State) {
        if state.running {
            while state.in_flight.len() < self.config.max_concurrent {
                let Some((file_id, index)) = state.session.next_pending() else {
                    break;
                };
                let job = match state.session.begin_chunk(&file_id, index) {
                    Ok(job) => job,
                    Err(e) => {
                        warn!(
                            file_id = %file_id,
                            chunk = index,
                            error = %e,
                            "cannot dispatch chunk"
                        );
                        break;
                    }
                };

                state.next_attempt += 1;
                let attempt = state.next_attempt;
                let cancel = self.shutdown.child_token();
                state.in_flight.insert(
                    (file_id.clone(), index),
                    Transfer {
                        attempt,
                        cancel: cancel.clone(),
                    },
                );
                debug!(
                    file_id = %file_id,
                    chunk = index,
                    attempt,
                    in_flight = state.in_flight.len(),
                    "chunk dispatched"
                );

                let params = state.params.clone();
                self.runtime
                    .spawn(Arc::clone(self).run_transfer(job, params, attempt, cancel));
            }
        }
        self.settle(state);
    }

    /// Emits `Complete` once every file is terminal, or `Idle` when a run
    /// stalls on chunks that need a manual retry.
    fn settle(&self, state: &mut State) {
        if !state.in_flight.is_empty() {
            return;
        }
        if state.running && state.session.next_pending().is_some() {
            return;
        }

        let was_running = std::mem::replace(&mut state.running, false);
        let counts = state.session.counts();
        if state.session.all_terminal() {
            if !state.complete_sent {
                state.complete_sent = true;
                info!(
                    session = %self.session_id,
                    completed = counts.completed,
                    failed = counts.failed,
                    "all files finished"
                );
                self.emit(UploadEvent::Complete {
                    action: self.config.mode.completion_action(),
                    completed: counts.completed,
                    failed: counts.failed,
                });
            }
        } else if was_running {
            let waiting = counts.total - counts.completed - counts.failed;
            info!(session = %self.session_id, waiting, "upload idle, waiting for retry");
            self.emit(UploadEvent::Idle { waiting });
        }
    }

    async fn run_transfer(
        self: Arc<Self>,
        job: ChunkJob,
        params: SessionParams,
        attempt: u64,
        cancel: CancellationToken,
    ) {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                trace!(
                    file_id = %job.file_id,
                    chunk = job.index,
                    attempt,
                    "chunk transfer aborted"
                );
                return;
            }
            outcome = self.transfer_chunk(&job, params) => outcome,
        };
        self.finish(job, attempt, outcome);
    }

    async fn transfer_chunk(
        &self,
        job: &ChunkJob,
        params: SessionParams,
    ) -> Result<ChunkOutcome, UploadError> {
        match self.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, self.send_once(job, params))
                .await
                .map_err(|_| UploadError::Timeout(limit))?,
            None => self.send_once(job, params).await,
        }
    }

    async fn send_once(
        &self,
        job: &ChunkJob,
        params: SessionParams,
    ) -> Result<ChunkOutcome, UploadError> {
        if self.config.test_chunks {
            match self
                .transport
                .test_chunk(job.form.clone(), params.clone())
                .await
            {
                Ok(true) => return Ok(ChunkOutcome::AlreadyPresent),
                Ok(false) => {}
                Err(e) => {
                    debug!(
                        file_id = %job.file_id,
                        chunk = job.index,
                        error = %e,
                        "chunk test failed, sending anyway"
                    );
                }
            }
        }

        let payload = read_payload(job).await?;
        self.transport
            .send_chunk(ChunkRequest {
                form: job.form.clone(),
                params,
                payload,
            })
            .await?;
        Ok(ChunkOutcome::Sent)
    }

    /// Applies a transfer result unless the chunk was aborted or
    /// re-dispatched since this attempt started.
    fn finish(
        self: &Arc<Self>,
        job: ChunkJob,
        attempt: u64,
        outcome: Result<ChunkOutcome, UploadError>,
    ) {
        let mut state = self.lock();
        let key = (job.file_id, job.index);
        let current = state
            .in_flight
            .get(&key)
            .is_some_and(|t| t.attempt == attempt);
        if !current {
            trace!(file_id = %key.0, chunk = key.1, attempt, "stale chunk result ignored");
            return;
        }
        state.in_flight.remove(&key);

        let (file_id, index) = key;
        match outcome {
            Ok(kind) => self.on_acknowledged(&mut state, &file_id, index, kind),
            Err(err) => self.on_failed(&mut state, &file_id, index, &err),
        }
        self.pump(&mut state);
    }

    fn on_acknowledged(
        &self,
        state: &mut State,
        file_id: &FileId,
        index: usize,
        kind: ChunkOutcome,
    ) {
        let (bytes, file_completed) = match state.session.acknowledge(file_id, index) {
            Ok(AckOutcome::Acknowledged {
                bytes,
                file_completed,
            }) => (bytes, file_completed),
            Ok(AckOutcome::AlreadyAcknowledged) => {
                trace!(file_id = %file_id, chunk = index, "chunk already acknowledged");
                return;
            }
            Err(e) => {
                warn!(file_id = %file_id, chunk = index, error = %e, "cannot acknowledge chunk");
                return;
            }
        };

        if matches!(kind, ChunkOutcome::Sent) {
            self.speed.add_sample(bytes);
        }
        debug!(file_id = %file_id, chunk = index, bytes, via = ?kind, "chunk acknowledged");

        let Some(file) = state.session.file(file_id) else {
            return;
        };
        let snapshot = file.snapshot();
        let file_progress = file.progress();
        let progress = state.session.progress();

        let report = if file_completed {
            state.throttle.mark_sent();
            true
        } else {
            state.throttle.ready()
        };
        if report {
            self.emit(UploadEvent::Progress {
                progress,
                file_id: file_id.clone(),
                file_progress,
                bytes_per_second: self.speed.bytes_per_second(),
            });
        }

        if file_completed {
            info!(file_id = %file_id, name = %snapshot.name, size = snapshot.size, "file uploaded");
            self.emit(UploadEvent::FileSuccess { file: snapshot });
        }
    }

    fn on_failed(&self, state: &mut State, file_id: &FileId, index: usize, err: &UploadError) {
        let reason = err.to_string();
        warn!(file_id = %file_id, chunk = index, error = %reason, "chunk transfer failed");

        let failure = match state.session.fail_chunk(
            file_id,
            index,
            self.config.max_chunk_failures,
            &reason,
        ) {
            Ok(failure) => failure,
            Err(e) => {
                warn!(file_id = %file_id, chunk = index, error = %e, "cannot record chunk failure");
                return;
            }
        };
        if failure.file_failed {
            let aborted = Self::abort_transfers(state, file_id);
            warn!(
                file_id = %file_id,
                failures = failure.failures,
                aborted,
                "file failed after repeated chunk errors"
            );
        }

        if let Some(file) = state.session.file(file_id) {
            self.emit(UploadEvent::FileError {
                file: file.snapshot(),
                chunk: Some(index),
                reason,
            });
        }
    }
}

/// Reads a chunk's bytes off the async runtime.
async fn read_payload(job: &ChunkJob) -> Result<Vec<u8>, UploadError> {
    let source = job.source.clone();
    let (offset, len) = (job.offset, job.len);
    let bytes = tokio::task::spawn_blocking(move || source.read_range(offset, len))
        .await
        .map_err(|e| UploadError::Task(e.to_string()))??;
    Ok(bytes)
}
