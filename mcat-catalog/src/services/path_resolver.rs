//! Reference classification
//!
//! Decides whether a reference string names a durable filesystem location.
//! Transient handles (`blob:`), embedded payloads (`data:`) and remote URLs
//! are never durable. `file://` URLs are decoded to plain absolute paths.
//! Pure: no I/O.

use crate::error::CatalogError;
use crate::models::DurablePath;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Why a reference is not durable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotDurableReason {
    Empty,
    /// `blob:` object-URL style reference
    TransientHandle,
    /// `data:` inline payload
    Embedded,
    /// Network URL (http, https, ftp, ...)
    Remote,
    /// `file:` URL that does not decode to a local absolute path
    MalformedFileUrl,
    /// Any other URL scheme
    UnknownScheme(String),
    /// Plain path that is not absolute
    Relative,
}

impl fmt::Display for NotDurableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotDurableReason::Empty => f.write_str("empty reference"),
            NotDurableReason::TransientHandle => f.write_str("transient handle"),
            NotDurableReason::Embedded => f.write_str("embedded payload"),
            NotDurableReason::Remote => f.write_str("remote URL"),
            NotDurableReason::MalformedFileUrl => f.write_str("malformed file URL"),
            NotDurableReason::UnknownScheme(s) => write!(f, "unsupported scheme '{}'", s),
            NotDurableReason::Relative => f.write_str("relative path"),
        }
    }
}

/// Classification result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Durable(DurablePath),
    NotDurable(NotDurableReason),
}

impl Classification {
    pub fn durable(self) -> Option<DurablePath> {
        match self {
            Classification::Durable(path) => Some(path),
            Classification::NotDurable(_) => None,
        }
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, Classification::Durable(_))
    }
}

const REMOTE_SCHEMES: &[&str] = &["http", "https", "ftp", "ftps", "ws", "wss", "s3", "gs"];

/// Classify a reference string
pub fn classify(reference: &str) -> Classification {
    let reference = reference.trim();
    if reference.is_empty() {
        return Classification::NotDurable(NotDurableReason::Empty);
    }

    // Elsewhere a drive-letter path is relative
    if cfg!(windows) && is_windows_drive_path(reference) {
        return Classification::Durable(DurablePath::new_unchecked(PathBuf::from(reference)));
    }

    if let Some(scheme) = scheme_of(reference) {
        let reason = match scheme.as_str() {
            "file" => return classify_file_url(reference),
            "blob" => NotDurableReason::TransientHandle,
            "data" => NotDurableReason::Embedded,
            s if REMOTE_SCHEMES.contains(&s) => NotDurableReason::Remote,
            _ => NotDurableReason::UnknownScheme(scheme),
        };
        return Classification::NotDurable(reason);
    }

    let path = Path::new(reference);
    if path.is_absolute() {
        Classification::Durable(DurablePath::new_unchecked(path.to_path_buf()))
    } else {
        Classification::NotDurable(NotDurableReason::Relative)
    }
}

/// Classify, mapping "not durable" to a [`CatalogError::PathClassification`]
pub fn require_durable(reference: &str) -> Result<DurablePath, CatalogError> {
    match classify(reference) {
        Classification::Durable(path) => Ok(path),
        Classification::NotDurable(reason) => Err(CatalogError::PathClassification {
            reference: truncate_for_log(reference),
            reason: reason.to_string(),
        }),
    }
}

/// Wrap an already-absolute path (e.g. produced by the stager)
pub fn from_absolute(path: PathBuf) -> Option<DurablePath> {
    path.is_absolute().then(|| DurablePath::new_unchecked(path))
}

fn classify_file_url(reference: &str) -> Classification {
    let parsed = match Url::parse(reference) {
        Ok(url) => url,
        Err(_) => return Classification::NotDurable(NotDurableReason::MalformedFileUrl),
    };
    // to_file_path percent-decodes and accepts an empty or "localhost" host
    match parsed.to_file_path() {
        Ok(path) if path.is_absolute() => {
            Classification::Durable(DurablePath::new_unchecked(path))
        }
        _ => Classification::NotDurable(NotDurableReason::MalformedFileUrl),
    }
}

/// URL scheme (lowercased) when `reference` starts with `scheme:`
///
/// Single-letter schemes are drive letters, not URLs.
fn scheme_of(reference: &str) -> Option<String> {
    let (scheme, _) = reference.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    let valid = scheme.len() > 1
        && first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then(|| scheme.to_ascii_lowercase())
}

fn is_windows_drive_path(reference: &str) -> bool {
    let bytes = reference.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

/// Data URLs can be megabytes; keep log lines short
pub(crate) fn truncate_for_log(reference: &str) -> String {
    const MAX: usize = 64;
    if reference.len() <= MAX {
        return reference.to_string();
    }
    let mut end = MAX;
    while !reference.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &reference[..end])
}
