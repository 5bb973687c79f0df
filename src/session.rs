//! Upload session: drives one file from chunk plan to job handle.
//!
//! The session owns the whole upload lifecycle: it derives the chunk plan,
//! feeds a FIFO queue of pending chunks through a `JoinSet` bounded by the
//! scheduler, retries individual chunks with backoff, and aborts everything
//! on the first chunk that exhausts its attempts. Partial progress is never
//! resumed across sessions; a retry of the same file starts a fresh plan.

use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{ChunkAck, ImportApiClient, JobHandle, UploadContext};
use crate::chunk::{plan_chunks, ChunkSpec, ChunkState, ChunkTask};
use crate::config::EngineConfig;
use crate::error::{redact, ImportError};
use crate::progress::{ProgressSink, ProgressTracker};
use crate::scheduler::UploadScheduler;

// ─────────────────────────────────────────────────────────────────────────────
// Transport seam
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for chunk transfer, allowing test fakes.
///
/// Implementations perform exactly one network transfer per call and never
/// retry internally; retry is session policy.
pub trait ChunkTransport: Send + Sync + Clone + 'static {
    fn upload_chunk<'a>(
        &'a self,
        ctx: &'a UploadContext,
        spec: ChunkSpec,
        bytes: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<ChunkAck, ImportError>> + Send + 'a>>;
}

impl ChunkTransport for ImportApiClient {
    fn upload_chunk<'a>(
        &'a self,
        ctx: &'a UploadContext,
        spec: ChunkSpec,
        bytes: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<ChunkAck, ImportError>> + Send + 'a>> {
        Box::pin(async move { ImportApiClient::upload_chunk(self, ctx, &spec, bytes).await })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session types
// ─────────────────────────────────────────────────────────────────────────────

/// How a completed upload hands off to the next phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The server started an asynchronous import job.
    Job(JobHandle),
    /// The server finished the import inline; payload is the result path.
    Immediate(String),
}

/// Lifecycle of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Uploading,
    Completed,
    Failed,
}

/// Identity of the file being uploaded, as the server sees it.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub upload_id: String,
    pub owner: String,
    pub file_name: String,
    pub file_path: PathBuf,
}

/// Drives one file through split, bounded-concurrency upload, and progress
/// aggregation to a terminal result.
pub struct UploadSession<T: ChunkTransport> {
    transport: T,
    config: EngineConfig,
    scheduler: UploadScheduler,
    cancel: CancellationToken,
    state: SessionState,
}

/// Outcome of one worker task: chunk index plus transfer result.
type WorkerResult = (u32, Result<ChunkAck, ImportError>);

impl<T: ChunkTransport> UploadSession<T> {
    pub fn new(transport: T, config: EngineConfig, cancel: CancellationToken) -> Self {
        let scheduler = UploadScheduler::new(config.max_concurrency);
        Self {
            transport,
            config,
            scheduler,
            cancel,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Uploads the file, returning the server's hand-off payload.
    ///
    /// On any fatal chunk failure all in-flight and pending work is cancelled
    /// and local task state is discarded.
    pub async fn run(
        &mut self,
        request: &UploadRequest,
        progress: &dyn ProgressSink,
    ) -> Result<UploadOutcome, ImportError> {
        self.state = SessionState::Uploading;

        let result = self.upload_all(request, progress).await;

        self.state = match &result {
            Ok(_) => SessionState::Completed,
            Err(_) => SessionState::Failed,
        };
        result
    }

    async fn upload_all(
        &self,
        request: &UploadRequest,
        progress: &dyn ProgressSink,
    ) -> Result<UploadOutcome, ImportError> {
        let metadata = tokio::fs::metadata(&request.file_path).await.map_err(|e| {
            ImportError::Validation(format!(
                "cannot read {}: {}",
                request.file_path.display(),
                e
            ))
        })?;
        let total_size = metadata.len();

        let specs = plan_chunks(total_size, self.config.chunk_size);
        if specs.is_empty() {
            return Err(ImportError::Validation("archive file is empty".into()));
        }

        let ctx = UploadContext {
            upload_id: request.upload_id.clone(),
            owner: request.owner.clone(),
            file_name: request.file_name.clone(),
            total_chunks: specs.len() as u32,
        };

        info!(
            "[UPLOAD] Session {} starting: {} bytes in {} chunks",
            redact(&request.upload_id),
            total_size,
            specs.len()
        );

        let mut tracker = ProgressTracker::new(total_size);
        let mut tasks: Vec<ChunkTask> = specs.iter().copied().map(ChunkTask::new).collect();
        let mut pending: VecDeque<ChunkSpec> = specs.into_iter().collect();
        let mut join_set: JoinSet<WorkerResult> = JoinSet::new();
        let mut outcome: Option<UploadOutcome> = None;

        loop {
            if self.cancel.is_cancelled() {
                join_set.shutdown().await;
                return Err(ImportError::Cancelled);
            }

            // Fill free slots from the FIFO queue; a chunk already acked is
            // never started again.
            while join_set.len() < self.config.max_concurrency {
                let Some(spec) = pending.pop_front() else { break };
                if tasks[spec.index as usize].state == ChunkState::Acked {
                    continue;
                }
                tasks[spec.index as usize].state = ChunkState::InFlight;

                let transport = self.transport.clone();
                let scheduler = self.scheduler.clone();
                let cancel = self.cancel.clone();
                let ctx = ctx.clone();
                let file_path = request.file_path.clone();
                let max_attempts = self.config.max_attempts;
                let backoff = self.config.retry_backoff;

                join_set.spawn(async move {
                    let _permit = scheduler.acquire().await;
                    if cancel.is_cancelled() {
                        return (spec.index, Err(ImportError::Cancelled));
                    }
                    let result = upload_chunk_with_retry(
                        &transport,
                        &ctx,
                        spec,
                        &file_path,
                        max_attempts,
                        backoff,
                        &cancel,
                    )
                    .await;
                    (spec.index, result)
                });
            }

            if join_set.is_empty() && pending.is_empty() {
                break;
            }

            let Some(joined) = join_set.join_next().await else { break };
            let (index, result) = joined
                .map_err(|e| ImportError::Internal(format!("upload task panicked: {}", e)))?;

            match result {
                Ok(ack) => {
                    tasks[index as usize].state = ChunkState::Acked;
                    if let Some(update) = tracker.record(index, ack.received_bytes) {
                        progress.on_progress(update);
                    }
                    if let Some(job) = ack.job {
                        outcome = Some(UploadOutcome::Job(job));
                    } else if let Some(path) = ack.result_path {
                        outcome = Some(UploadOutcome::Immediate(path));
                    }
                }
                Err(ImportError::Cancelled) => {
                    join_set.shutdown().await;
                    return Err(ImportError::Cancelled);
                }
                Err(e) => {
                    // First fatal chunk aborts the whole session
                    tasks[index as usize].state = ChunkState::Failed;
                    warn!(
                        "[UPLOAD] Chunk {} exhausted retries ({} transfers still in flight): {}",
                        index,
                        self.scheduler.in_flight(),
                        e
                    );
                    self.cancel.cancel();
                    join_set.shutdown().await;
                    return Err(ImportError::Transport {
                        chunk_index: index,
                        message: e.to_string(),
                    });
                }
            }
        }

        if self.cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }

        info!(
            "[UPLOAD] Session {} complete: {}/{} chunks acked",
            redact(&request.upload_id),
            tracker.acked_count(),
            tasks.len()
        );

        outcome.ok_or_else(|| {
            ImportError::Internal(
                "upload completed but the server returned neither a job nor a result".into(),
            )
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker
// ─────────────────────────────────────────────────────────────────────────────

/// Uploads a single chunk, retrying with doubling backoff.
///
/// Retries cover both network failures and server rejections; only
/// cancellation short-circuits. The session holds one scheduler permit for
/// the full duration, retries included.
async fn upload_chunk_with_retry<T: ChunkTransport>(
    transport: &T,
    ctx: &UploadContext,
    spec: ChunkSpec,
    file_path: &Path,
    max_attempts: u32,
    base_backoff: std::time::Duration,
    cancel: &CancellationToken,
) -> Result<ChunkAck, ImportError> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let result = match read_chunk_bytes(file_path, &spec).await {
            Ok(bytes) => transport.upload_chunk(ctx, spec, bytes).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(ack) => return Ok(ack),
            Err(ImportError::Cancelled) => return Err(ImportError::Cancelled),
            Err(e) if attempt < max_attempts => {
                warn!(
                    "[UPLOAD] Chunk {} attempt {}/{} failed: {}",
                    spec.index, attempt, max_attempts, e
                );
                let delay = base_backoff * 2u32.saturating_pow(attempt - 1);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ImportError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Reads exactly the chunk's byte range from the file.
async fn read_chunk_bytes(file_path: &Path, spec: &ChunkSpec) -> Result<Bytes, ImportError> {
    let mut file = tokio::fs::File::open(file_path)
        .await
        .map_err(|e| ImportError::Internal(format!("failed to open archive: {}", e)))?;

    file.seek(std::io::SeekFrom::Start(spec.offset))
        .await
        .map_err(|e| ImportError::Internal(format!("failed to seek chunk {}: {}", spec.index, e)))?;

    let mut buf = vec![0u8; spec.length as usize];
    file.read_exact(&mut buf)
        .await
        .map_err(|e| ImportError::Internal(format!("failed to read chunk {}: {}", spec.index, e)))?;

    Ok(Bytes::from(buf))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
