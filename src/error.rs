use serde::Serialize;
use thiserror::Error;

/// Patterns (lowercase) that indicate sensitive data not safe for UI display.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] =
    &["bearer ", "access_token", "session_token", "authorization:"];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for UI display.
/// If sensitive content is detected, returns the fallback instead.
pub(crate) fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// Redacts an opaque id for logging, keeping at most its first 8 characters.
///
/// Ids are opaque server-assigned strings and may contain multibyte
/// characters, so truncation must land on a char boundary.
pub(crate) fn redact(id: &str) -> String {
    match id.char_indices().nth(8) {
        Some((cut, _)) => format!("{}...", &id[..cut]),
        None => id.to_string(),
    }
}

/// User-friendly error presentation for the frontend.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Engine-wide error type.
#[derive(Debug, Error)]
pub enum ImportError {
    // ── Validation ────────────────────────────────────────────────────────────
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("An import is already running for workspace {workspace}")]
    Locked { workspace: String },

    // ── Upload ────────────────────────────────────────────────────────────────
    #[error("Chunk {chunk_index} failed after all retries: {message}")]
    Transport { chunk_index: u32, message: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Server rejected request: HTTP {status} - {message}")]
    ServerRejected { status: u16, message: String },

    // ── Job ───────────────────────────────────────────────────────────────────
    #[error("Import job {job_key} failed: {message}")]
    JobFailed { job_key: String, message: String },

    // ── Post-import ───────────────────────────────────────────────────────────
    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Could not derive resource name: {0}")]
    NameDerivation(String),

    // ── Control ───────────────────────────────────────────────────────────────
    #[error("Operation cancelled")]
    Cancelled,

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ImportError {
    /// Converts the error into a user-friendly presentation suitable for UI display.
    /// Never leaks session tokens or auth headers.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            ImportError::Validation(msg) => ErrorPresentation {
                title: "Invalid Import".into(),
                message: msg.clone(),
                action: Some("Check the file or URL and try again".into()),
            },

            ImportError::Locked { workspace: _ } => ErrorPresentation {
                title: "Import In Progress".into(),
                message: "Another import is already running for this workspace.".into(),
                action: Some("Wait for the current import to finish".into()),
            },

            ImportError::Transport { chunk_index: _, message } => ErrorPresentation {
                title: "Upload Failed".into(),
                message: sanitize_message(message, "Part of the file could not be uploaded."),
                action: Some("Check your connection and retry the upload".into()),
            },

            ImportError::ConnectionFailed(_) => ErrorPresentation {
                title: "Connection Failed".into(),
                message: "Could not reach the server. Please check your internet connection."
                    .into(),
                action: Some("Check network and retry".into()),
            },

            ImportError::ServerRejected { status, message } => ErrorPresentation {
                title: "Server Error".into(),
                message: sanitize_message(
                    message,
                    &format!("The server rejected the request (HTTP {}).", status),
                ),
                action: None,
            },

            ImportError::JobFailed { job_key: _, message } => ErrorPresentation {
                title: "Import Failed".into(),
                message: sanitize_message(message, "The server could not unpack the archive."),
                action: Some("Review the error and try again".into()),
            },

            ImportError::BuildFailed(msg) => ErrorPresentation {
                title: "Build Failed".into(),
                message: sanitize_message(msg, "The project was imported but the build failed."),
                action: Some("Trigger the build again from the project page".into()),
            },

            ImportError::NameDerivation(msg) => ErrorPresentation {
                title: "Unexpected Server Response".into(),
                message: msg.clone(),
                action: None,
            },

            ImportError::Cancelled => ErrorPresentation {
                title: "Cancelled".into(),
                message: "The import was cancelled.".into(),
                action: None,
            },

            ImportError::Internal(_) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: "Something went wrong. Please try again.".into(),
                action: Some("Try again".into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns all ImportError variants for exhaustive testing.
    fn all_variants() -> Vec<ImportError> {
        vec![
            ImportError::Validation("bad extension".into()),
            ImportError::Locked { workspace: "alice/proj1".into() },
            ImportError::Transport { chunk_index: 3, message: "connection reset".into() },
            ImportError::ConnectionFailed("timeout".into()),
            ImportError::ServerRejected { status: 400, message: "bad chunk".into() },
            ImportError::JobFailed { job_key: "job-1".into(), message: "corrupt zip".into() },
            ImportError::BuildFailed("image build error".into()),
            ImportError::NameDerivation("no delimiter in payload".into()),
            ImportError::Cancelled,
            ImportError::Internal("something broke".into()),
        ]
    }

    #[test]
    fn all_variants_have_nonempty_title_and_message() {
        for variant in all_variants() {
            let presentation = variant.to_presentation();
            assert!(
                !presentation.title.trim().is_empty(),
                "Empty title for {:?}",
                variant
            );
            assert!(
                !presentation.message.trim().is_empty(),
                "Empty message for {:?}",
                variant
            );
        }
    }

    #[test]
    fn no_secret_leakage_in_presentation() {
        let test_cases: Vec<(&str, ImportError)> = vec![
            (
                "Transport",
                ImportError::Transport {
                    chunk_index: 0,
                    message: "Bearer abc123 rejected".into(),
                },
            ),
            (
                "ServerRejected",
                ImportError::ServerRejected {
                    status: 401,
                    message: "AUTHORIZATION: Bearer token".into(),
                },
            ),
            (
                "JobFailed",
                ImportError::JobFailed {
                    job_key: "job-1".into(),
                    message: "access_token=xyz expired".into(),
                },
            ),
            ("BuildFailed", ImportError::BuildFailed("session_token leaked".into())),
        ];

        for (label, variant) in test_cases {
            let presentation = variant.to_presentation();
            let output_lower = format!(
                "{} {} {}",
                presentation.title,
                presentation.message,
                presentation.action.as_deref().unwrap_or("")
            )
            .to_ascii_lowercase();

            for pattern in SENSITIVE_PATTERNS {
                assert!(
                    !output_lower.contains(pattern),
                    "{} presentation contains sensitive pattern",
                    label
                );
            }
        }
    }

    #[test]
    fn redact_keeps_first_eight_chars() {
        assert_eq!(redact("0123456789abcdef"), "01234567...");
        assert_eq!(redact("exactly8"), "exactly8");
        assert_eq!(redact("short"), "short");
    }

    #[test]
    fn redact_respects_char_boundaries() {
        // Byte 8 falls inside the multibyte character; truncation must not
        // split it
        assert_eq!(redact("1234567€90"), "1234567€...");
        assert_eq!(redact("日本語のジョブキーです"), "日本語のジョブキ...");
    }

    #[test]
    fn locked_error_names_workspace_in_display() {
        let err = ImportError::Locked { workspace: "alice/proj1".into() };
        assert!(err.to_string().contains("alice/proj1"));
    }

    #[test]
    fn transport_error_names_chunk_index() {
        let err = ImportError::Transport { chunk_index: 7, message: "reset".into() };
        assert!(err.to_string().contains('7'));
    }
}
