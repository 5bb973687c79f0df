//! Top-level import orchestration.
//!
//! One import runs as a strict phase sequence: validate, lock the workspace,
//! upload or clone, await the server-side job, derive the canonical name,
//! trigger the dependent build (projects only), then emit exactly one
//! terminal event. Earlier revisions of this flow chained callbacks across
//! near-duplicate modules and could navigate twice; the single driver with a
//! phase tag makes double delivery impossible.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{CloneOutcome, ImportApiClient};
use crate::config::EngineConfig;
use crate::error::{redact, ErrorPresentation, ImportError};
use crate::lock::WorkspaceLocks;
use crate::naming::{name_from_result_path, proposed_name_from_filename};
use crate::poller::{JobPoll, JobStatusPoller};
use crate::progress::{ProgressSink, ProgressUpdate};
use crate::session::{ChunkTransport, UploadOutcome, UploadRequest, UploadSession};
use crate::validation::{parse_remote_url, validate_archive_name};

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response Types
// ─────────────────────────────────────────────────────────────────────────────

/// What is being imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Project,
    Dataset,
}

/// Where the import comes from.
#[derive(Debug, Clone)]
pub enum ImportSource {
    /// A local archive dropped or picked by the user.
    LocalFile { path: PathBuf, file_name: String },
    /// A remote repository URL to clone server-side.
    Remote { url: String },
}

/// A request to import one project or dataset.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub kind: ImportKind,
    /// Workspace owner; for remote imports the owner is taken from the URL
    /// instead.
    pub owner: String,
    /// Explicit resource name; when absent the name is derived from the
    /// file name (local) or the URL (remote).
    pub requested_name: Option<String>,
    pub source: ImportSource,
}

/// Phase of an active import session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    Validating,
    Uploading,
    AwaitingJob,
    DerivingName,
    Building,
    Done,
    Failed,
}

/// Result of a fully completed import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedImport {
    pub owner: String,
    pub name: String,
    pub navigation_target: String,
    /// Set when the dependent build failed; the import itself still
    /// succeeded.
    pub build_failure: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Collaborator seams
// ─────────────────────────────────────────────────────────────────────────────

/// Presentation-layer sinks the engine emits into.
///
/// All methods are fire-and-forget; implementations must not block.
pub trait EventSink: Send + Sync {
    /// Aggregate upload progress, 0 to 100 exactly once per session.
    fn progress(&self, update: ProgressUpdate);
    /// Human-readable intermediate feedback from the server-side job.
    fn feedback(&self, message: &str);
    /// Terminal success; fired at most once per session.
    fn completed(&self, navigation_target: &str);
    /// Terminal failure; fired at most once per session.
    fn failed(&self, error: &ErrorPresentation);
    /// Secondary notification: the import succeeded but the dependent build
    /// did not. Never fired together with `failed`.
    fn build_failed(&self, error: &ErrorPresentation);
    /// Raised while bytes are in flight so the shell can warn about
    /// navigating away; lowered on phase exit.
    fn set_transfer_guard(&self, active: bool);
}

/// Remote operations the orchestrator needs beyond chunk transfer and job
/// polling, allowing test fakes.
pub trait ImportApi: ChunkTransport + JobPoll {
    fn clone_remote<'a>(
        &'a self,
        owner: &'a str,
        name: &'a str,
        remote_url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<CloneOutcome, ImportError>> + Send + 'a>>;

    fn trigger_build<'a>(
        &'a self,
        owner: &'a str,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), ImportError>> + Send + 'a>>;
}

impl ImportApi for ImportApiClient {
    fn clone_remote<'a>(
        &'a self,
        owner: &'a str,
        name: &'a str,
        remote_url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<CloneOutcome, ImportError>> + Send + 'a>> {
        Box::pin(ImportApiClient::clone_remote(self, owner, name, remote_url))
    }

    fn trigger_build<'a>(
        &'a self,
        owner: &'a str,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), ImportError>> + Send + 'a>> {
        Box::pin(ImportApiClient::trigger_build(self, owner, name))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation registry
// ─────────────────────────────────────────────────────────────────────────────

/// Cancellation tokens for active sessions, keyed by session id.
#[derive(Clone, Default)]
pub struct CancelRegistry {
    tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn insert(&self, session_id: String, token: CancellationToken) {
        self.tokens.lock().await.insert(session_id, token);
    }

    async fn remove(&self, session_id: &str) {
        self.tokens.lock().await.remove(session_id);
    }

    /// Cancels the session if it is still active.
    pub async fn cancel(&self, session_id: &str) {
        if let Some(token) = self.tokens.lock().await.get(session_id) {
            token.cancel();
        }
    }

    pub async fn is_active(&self, session_id: &str) -> bool {
        self.tokens.lock().await.contains_key(session_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ImportOrchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// Sequences one import from validation to terminal event.
pub struct ImportOrchestrator<A: ImportApi> {
    api: A,
    config: EngineConfig,
    locks: WorkspaceLocks,
    sink: Arc<dyn EventSink>,
    cancels: CancelRegistry,
}

/// Adapter so the upload session can feed the event sink.
struct SinkProgress(Arc<dyn EventSink>);

impl ProgressSink for SinkProgress {
    fn on_progress(&self, update: ProgressUpdate) {
        self.0.progress(update);
    }
}

impl<A: ImportApi> ImportOrchestrator<A> {
    pub fn new(
        api: A,
        config: EngineConfig,
        locks: WorkspaceLocks,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            api,
            config,
            locks,
            sink,
            cancels: CancelRegistry::new(),
        }
    }

    /// Registry for cancelling active sessions from outside.
    pub fn cancel_registry(&self) -> CancelRegistry {
        self.cancels.clone()
    }

    /// Runs one import under a fresh session id.
    pub async fn run(&self, request: ImportRequest) -> Result<CompletedImport, ImportError> {
        self.run_with_id(&Uuid::new_v4().to_string(), request).await
    }

    /// Runs one import under a caller-chosen session id, so the caller can
    /// cancel it through the registry while it is in flight.
    ///
    /// Emits exactly one terminal event: `completed` on success, `failed` on
    /// error. A cancelled session emits no terminal event at all.
    pub async fn run_with_id(
        &self,
        session_id: &str,
        request: ImportRequest,
    ) -> Result<CompletedImport, ImportError> {
        let cancel = CancellationToken::new();
        self.cancels.insert(session_id.to_string(), cancel.clone()).await;

        let result = self.drive(session_id, &request, cancel).await;

        self.cancels.remove(session_id).await;

        match &result {
            Ok(done) => {
                self.sink.completed(&done.navigation_target);
                if let Some(build_message) = &done.build_failure {
                    self.sink
                        .build_failed(&ImportError::BuildFailed(build_message.clone()).to_presentation());
                }
            }
            // A cancelled session must not emit a terminal event
            Err(ImportError::Cancelled) => {
                info!("[IMPORT] Session {} cancelled", redact(session_id));
            }
            Err(e) => self.sink.failed(&e.to_presentation()),
        }

        result
    }

    /// The phase-tagged driver: advances the session and records the phase
    /// an error stopped it in.
    async fn drive(
        &self,
        session_id: &str,
        request: &ImportRequest,
        cancel: CancellationToken,
    ) -> Result<CompletedImport, ImportError> {
        let mut phase = ImportPhase::Validating;
        info!("[IMPORT] Session {} -> {:?}", redact(session_id), phase);

        let result = self.advance(session_id, request, cancel, &mut phase).await;

        if let Err(e) = &result {
            warn!(
                "[IMPORT] Session {} stopped in {:?}: {}",
                redact(session_id),
                phase,
                e
            );
            set_phase(session_id, &mut phase, ImportPhase::Failed);
        }
        result
    }

    /// Runs the phase sequence. The workspace lock guard lives on this
    /// function's stack, so every exit path releases it exactly once.
    async fn advance(
        &self,
        session_id: &str,
        request: &ImportRequest,
        cancel: CancellationToken,
        phase: &mut ImportPhase,
    ) -> Result<CompletedImport, ImportError> {
        // Validation resolves locally; no lock is taken and no network
        // activity starts until it passes.
        let (owner, name) = match &request.source {
            ImportSource::LocalFile { file_name, .. } => {
                validate_archive_name(file_name)?;
                let name = match &request.requested_name {
                    Some(name) => name.clone(),
                    None => proposed_name_from_filename(file_name)?,
                };
                (request.owner.clone(), name)
            }
            ImportSource::Remote { url } => {
                let coords = parse_remote_url(url)?;
                (coords.owner, request.requested_name.clone().unwrap_or(coords.name))
            }
        };

        let workspace = format!("{}/{}", owner, name);
        let _lock = self.locks.try_lock(&workspace)?;
        info!("[IMPORT] Session {} locked workspace {}", redact(session_id), workspace);

        // Upload or clone, with the navigate-away guard raised while bytes
        // are in flight.
        set_phase(session_id, phase, ImportPhase::Uploading);
        self.sink.set_transfer_guard(true);
        let handoff = self
            .transfer(session_id, request, &owner, &name, cancel.clone())
            .await;
        self.sink.set_transfer_guard(false);
        let handoff = handoff?;

        // Await the server-side job unless the transfer completed inline.
        let result_path = match handoff {
            UploadOutcome::Immediate(path) => path,
            UploadOutcome::Job(handle) => {
                set_phase(session_id, phase, ImportPhase::AwaitingJob);
                let poller = JobStatusPoller::new(&self.api, &self.config, cancel.clone());
                let sink = self.sink.clone();
                poller
                    .poll_to_completion(&handle.key, move |msg| sink.feedback(msg))
                    .await?
            }
        };

        set_phase(session_id, phase, ImportPhase::DerivingName);
        let canonical = name_from_result_path(&result_path)?;

        // The dependent build is reported independently and never rolls back
        // a completed import.
        let mut build_failure = None;
        if request.kind == ImportKind::Project {
            set_phase(session_id, phase, ImportPhase::Building);
            if let Err(e) = self.api.trigger_build(&owner, &canonical).await {
                warn!("[IMPORT] Build for {}/{} failed: {}", owner, canonical, e);
                build_failure = Some(e.to_string());
            }
        }

        set_phase(session_id, phase, ImportPhase::Done);
        let navigation_target = match request.kind {
            ImportKind::Project => format!("/projects/{}/{}", owner, canonical),
            ImportKind::Dataset => format!("/datasets/{}/{}", owner, canonical),
        };

        Ok(CompletedImport {
            owner,
            name: canonical,
            navigation_target,
            build_failure,
        })
    }

    /// Runs the local upload session or the remote clone request.
    async fn transfer(
        &self,
        session_id: &str,
        request: &ImportRequest,
        owner: &str,
        name: &str,
        cancel: CancellationToken,
    ) -> Result<UploadOutcome, ImportError> {
        match &request.source {
            ImportSource::LocalFile { path, file_name } => {
                let upload_request = UploadRequest {
                    upload_id: session_id.to_string(),
                    owner: owner.to_string(),
                    file_name: file_name.clone(),
                    file_path: path.clone(),
                };
                let mut session =
                    UploadSession::new(self.api.clone(), self.config.clone(), cancel);
                let progress = SinkProgress(self.sink.clone());
                session.run(&upload_request, &progress).await
            }
            ImportSource::Remote { url } => {
                // The clone itself is a single request; once issued it runs
                // to completion server-side.
                if cancel.is_cancelled() {
                    return Err(ImportError::Cancelled);
                }
                let outcome = self.api.clone_remote(owner, name, url).await?;
                match (outcome.job, outcome.result_path) {
                    (Some(handle), _) => Ok(UploadOutcome::Job(handle)),
                    (None, Some(path)) => Ok(UploadOutcome::Immediate(path)),
                    (None, None) => Err(ImportError::Internal(
                        "clone response carried neither a job nor a result".into(),
                    )),
                }
            }
        }
    }
}

/// Logs and applies a phase transition.
fn set_phase(session_id: &str, phase: &mut ImportPhase, next: ImportPhase) {
    info!("[IMPORT] Session {} -> {:?}", redact(session_id), next);
    *phase = next;
}
