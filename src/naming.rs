//! Canonical resource name derivation.
//!
//! Two published conventions exist and both must be reproduced exactly for
//! compatibility with server-generated names:
//!
//! - server result paths: `alice/proj1_20230101120000.zip` names `proj1`
//!   (final path segment, up to the first `_`);
//! - locally-typed filenames: `myproject-7f3ac1.lbk` proposes `myproject`
//!   (hyphen-delimited segments with the trailing disambiguating suffix
//!   dropped).
//!
//! Payloads that do not match a convention are a hard error rather than a
//! guess.

use crate::error::ImportError;

/// Derives the canonical resource name from a server-assigned result path.
pub fn name_from_result_path(result_path: &str) -> Result<String, ImportError> {
    let segment = result_path
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ImportError::NameDerivation(format!("result path {:?} has no final segment", result_path))
        })?;

    let name = segment.split('_').next().unwrap_or("");
    if name.is_empty() || name == segment {
        return Err(ImportError::NameDerivation(format!(
            "result segment {:?} does not follow the name_timestamp convention",
            segment
        )));
    }

    Ok(name.to_string())
}

/// Derives a proposed resource name from a dropped file's name, before any
/// upload starts.
pub fn proposed_name_from_filename(file_name: &str) -> Result<String, ImportError> {
    let stem = file_name.rsplit_once('.').map_or(file_name, |(stem, _)| stem);

    let segments: Vec<&str> = stem.split('-').collect();
    if segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
        return Err(ImportError::NameDerivation(format!(
            "filename {:?} does not carry a hyphenated suffix",
            file_name
        )));
    }

    Ok(segments[..segments.len() - 1].join("-"))
}
