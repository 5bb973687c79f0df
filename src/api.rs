//! HTTP client for the import backend.
//!
//! This module provides functionality to:
//! - Upload one byte-range chunk of a local archive
//! - Start a server-side clone of a remote repository
//! - Poll an asynchronous import job by its opaque key
//! - Trigger the dependent image build after a successful project import
//!
//! # Security
//!
//! - Session tokens are never logged
//! - Job keys and upload ids are redacted in logs
//! - Only HTTP method, path, and status codes are logged

use std::sync::Arc;

use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::chunk::ChunkSpec;
use crate::error::{redact, ImportError};

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Server-side job lifecycle.
///
/// Uses `#[serde(rename_all = "lowercase")]` to match the backend, which
/// reports lowercase status strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Started,
    Finished,
    Failed,
}

impl JobStatus {
    /// Returns true for states from which no further transitions occur.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }
}

/// Opaque handle to a server-side import job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Opaque key assigned by the server; treated as a black box.
    pub key: String,
}

/// Identifies one upload session to the server.
#[derive(Debug, Clone)]
pub struct UploadContext {
    /// Client-generated id for this upload session.
    pub upload_id: String,
    /// Workspace owner the archive is imported for.
    pub owner: String,
    /// Original archive file name.
    pub file_name: String,
    /// Total number of chunks the server should expect.
    pub total_chunks: u32,
}

/// Server acknowledgment of one chunk.
///
/// The acknowledgment that completes the upload carries either a job handle
/// or, for import kinds the server finishes synchronously, an immediate
/// result path.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkAck {
    /// Bytes of this chunk the server accepted.
    pub received_bytes: u64,
    /// Present on the final acknowledgment when an async job was started.
    #[serde(default)]
    pub job: Option<JobHandle>,
    /// Present on the final acknowledgment when the import completed inline.
    #[serde(default)]
    pub result_path: Option<String>,
}

/// Server response to a remote-clone request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneOutcome {
    #[serde(default)]
    pub job: Option<JobHandle>,
    #[serde(default)]
    pub result_path: Option<String>,
}

/// One observation of a job's state.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub status: JobStatus,
    /// Server-assigned result path, set once the job finishes.
    #[serde(default)]
    pub result_path: Option<String>,
    /// Failure message, set when the job fails.
    #[serde(default)]
    pub failure_message: Option<String>,
    /// Optional human-readable progress feedback on non-terminal polls.
    #[serde(default)]
    pub feedback: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for starting a remote clone.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CloneRequest<'a> {
    owner: &'a str,
    name: &'a str,
    remote_url: &'a str,
}

/// Request body for triggering the dependent build.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildRequest<'a> {
    owner: &'a str,
    name: &'a str,
}

/// Backend error response format.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// ImportApiClient
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the import backend's upload, clone, job, and build endpoints.
#[derive(Clone)]
pub struct ImportApiClient {
    /// Shared HTTP client.
    client: Arc<Client>,
    /// Backend base URL.
    base_url: Url,
    /// Session token for authentication.
    session_token: String,
}

impl ImportApiClient {
    pub fn new(client: Arc<Client>, base_url: Url, session_token: String) -> Self {
        Self {
            client,
            base_url,
            session_token,
        }
    }

    /// Uploads one chunk of an archive.
    ///
    /// The server deduplicates by chunk index, so repeating a delivery is
    /// safe from the caller's perspective.
    ///
    /// # Errors
    ///
    /// - `ImportError::ServerRejected` - backend rejected the chunk
    /// - `ImportError::ConnectionFailed` - network error
    pub async fn upload_chunk(
        &self,
        ctx: &UploadContext,
        spec: &ChunkSpec,
        bytes: Bytes,
    ) -> Result<ChunkAck, ImportError> {
        let url = self.build_chunk_url(&ctx.upload_id, spec.index)?;
        let total_chunks = ctx.total_chunks.to_string();
        let offset = spec.offset.to_string();

        info!(
            "[API] PUT /uploads/{}/chunks/{} ({} bytes)",
            redact(&ctx.upload_id),
            spec.index,
            bytes.len()
        );

        let response = self
            .client
            .put(url)
            .bearer_auth(&self.session_token)
            .header("Content-Type", "application/octet-stream")
            .query(&[
                ("owner", ctx.owner.as_str()),
                ("filename", ctx.file_name.as_str()),
                ("totalChunks", total_chunks.as_str()),
                ("offset", offset.as_str()),
            ])
            .body(bytes)
            .send()
            .await
            .map_err(|e| ImportError::ConnectionFailed(format!("chunk upload failed: {}", e)))?;

        let status = response.status();
        info!(
            "[API] PUT /uploads/{}/chunks/{} -> {}",
            redact(&ctx.upload_id),
            spec.index,
            status.as_u16()
        );

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        response.json().await.map_err(|e| {
            ImportError::ServerRejected {
                status: status.as_u16(),
                message: format!("unreadable chunk acknowledgment: {}", e),
            }
        })
    }

    /// Starts a server-side clone of a remote repository.
    pub async fn clone_remote(
        &self,
        owner: &str,
        name: &str,
        remote_url: &str,
    ) -> Result<CloneOutcome, ImportError> {
        let url = self.build_url("/api/imports/clone")?;

        info!("[API] POST /imports/clone ({}/{})", owner, name);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.session_token)
            .json(&CloneRequest { owner, name, remote_url })
            .send()
            .await
            .map_err(|e| ImportError::ConnectionFailed(format!("clone request failed: {}", e)))?;

        let status = response.status();
        info!("[API] POST /imports/clone -> {}", status.as_u16());

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        response.json().await.map_err(|e| ImportError::ServerRejected {
            status: status.as_u16(),
            message: format!("unreadable clone response: {}", e),
        })
    }

    /// Fetches the current state of a job.
    pub async fn poll_job(&self, job_key: &str) -> Result<JobSnapshot, ImportError> {
        let url = self.build_url(&format!("/api/jobs/{}", job_key))?;

        info!("[API] GET /jobs/{} (status)", redact(job_key));

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.session_token)
            .send()
            .await
            .map_err(|e| ImportError::ConnectionFailed(format!("job poll failed: {}", e)))?;

        let status = response.status();
        info!("[API] GET /jobs/{} -> {}", redact(job_key), status.as_u16());

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        response.json().await.map_err(|e| ImportError::ServerRejected {
            status: status.as_u16(),
            message: format!("unreadable job snapshot: {}", e),
        })
    }

    /// Triggers the dependent image build for an imported project.
    pub async fn trigger_build(&self, owner: &str, name: &str) -> Result<(), ImportError> {
        let url = self.build_url("/api/builds")?;

        info!("[API] POST /builds ({}/{})", owner, name);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.session_token)
            .json(&BuildRequest { owner, name })
            .send()
            .await
            .map_err(|e| ImportError::ConnectionFailed(format!("build request failed: {}", e)))?;

        let status = response.status();
        info!("[API] POST /builds -> {}", status.as_u16());

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // URL Builders
    // ─────────────────────────────────────────────────────────────────────────

    fn build_url(&self, path: &str) -> Result<Url, ImportError> {
        self.base_url
            .join(path)
            .map_err(|e| ImportError::Internal(format!("failed to build URL for {}: {}", path, e)))
    }

    /// Builds the chunk URL: /api/uploads/{upload_id}/chunks/{index}
    fn build_chunk_url(&self, upload_id: &str, index: u32) -> Result<Url, ImportError> {
        self.build_url(&format!("/api/uploads/{}/chunks/{}", upload_id, index))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Handling
// ─────────────────────────────────────────────────────────────────────────────

/// Parses an error response body into an ImportError.
async fn parse_error_response(
    response: reqwest::Response,
    status: reqwest::StatusCode,
) -> ImportError {
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("Unable to read error body"));

    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.message)
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });

    ImportError::ServerRejected {
        status: status.as_u16(),
        message,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
