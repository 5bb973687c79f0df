//! Pre-flight import validation.
//!
//! Everything here resolves locally, before any network activity or lock
//! acquisition: archive extension checks for local files, and owner/name
//! extraction for remote repository URLs.

use url::Url;

use crate::error::ImportError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Accepted archive extensions for local imports (lowercase, longest first so
/// compound extensions match before their tails).
pub const ALLOWED_ARCHIVE_EXTENSIONS: &[&str] = &[".tar.gz", ".tgz", ".tar", ".zip", ".lbk"];

// ─────────────────────────────────────────────────────────────────────────────
// Local files
// ─────────────────────────────────────────────────────────────────────────────

/// Checks a local file name against the archive allow-list.
pub fn validate_archive_name(file_name: &str) -> Result<(), ImportError> {
    let lower = file_name.to_ascii_lowercase();
    let accepted = ALLOWED_ARCHIVE_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(ext) && lower.len() > ext.len());

    if accepted {
        Ok(())
    } else {
        Err(ImportError::Validation(format!(
            "{:?} is not a supported archive ({})",
            file_name,
            ALLOWED_ARCHIVE_EXTENSIONS.join(", ")
        )))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Remote URLs
// ─────────────────────────────────────────────────────────────────────────────

/// Owner and repository name extracted from a remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCoordinates {
    pub owner: String,
    pub name: String,
}

/// Parses owner/name from a remote repository URL.
///
/// Rule: owner is the second-to-last `/`-delimited path segment, name the
/// last. A trailing slash is tolerated.
pub fn parse_remote_url(remote_url: &str) -> Result<RemoteCoordinates, ImportError> {
    if remote_url.trim().is_empty() {
        return Err(ImportError::Validation("remote URL is empty".into()));
    }

    let url = Url::parse(remote_url)
        .map_err(|e| ImportError::Validation(format!("invalid remote URL: {}", e)))?;

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        [.., owner, name] => Ok(RemoteCoordinates {
            owner: (*owner).to_string(),
            name: (*name).to_string(),
        }),
        _ => Err(ImportError::Validation(format!(
            "remote URL {:?} does not contain owner and repository segments",
            remote_url
        ))),
    }
}
