//! Upload and import orchestration engine.
//!
//! Takes a local archive or a remote repository URL and drives it through
//! chunked upload (or server-side clone), job polling, canonical name
//! derivation, and the dependent build, emitting progress and exactly one
//! terminal event per session.

pub mod api;
pub mod chunk;
pub mod config;
pub mod error;
pub mod lock;
pub mod naming;
pub mod orchestrator;
pub mod poller;
pub mod progress;
pub mod scheduler;
pub mod session;
pub mod validation;

pub use api::ImportApiClient;
pub use config::EngineConfig;
pub use error::{ErrorPresentation, ImportError};
pub use lock::WorkspaceLocks;
pub use orchestrator::{
    CancelRegistry, CompletedImport, EventSink, ImportKind, ImportOrchestrator, ImportRequest,
    ImportSource,
};
pub use progress::{ProgressSink, ProgressUpdate};
