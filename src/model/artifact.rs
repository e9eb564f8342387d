//! Model artifact files
//!
//! An artifact is a single JSON document:
//!
//! ```text
//! { "format": "monster-lab/model", "version": 1, "model": { ... } }
//! ```
//!
//! Writes go to a sibling temp file that is renamed over the target, so a
//! crashed save never leaves a truncated artifact behind.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Well-known artifact location
pub const DEFAULT_ARTIFACT_PATH: &str = "model.json";

/// Format tag stored in every artifact
pub const ARTIFACT_FORMAT: &str = "monster-lab/model";

/// Current artifact format version
pub const ARTIFACT_VERSION: u32 = 1;

/// Artifact Record describes a model artifact written to disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRecord {
    path: PathBuf,
    format_version: u32,
    size_bytes: u64,
    created_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// Create a new artifact record stamped with the current time.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            format_version: ARTIFACT_VERSION,
            size_bytes,
            created_at: Utc::now(),
        }
    }

    /// Get the artifact path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the artifact format version.
    #[must_use]
    pub const fn format_version(&self) -> u32 {
        self.format_version
    }

    /// Get the artifact size in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    format: &'a str,
    version: u32,
    model: &'a T,
}

#[derive(Deserialize)]
struct Header {
    format: String,
    version: u32,
}

#[derive(Deserialize)]
struct Body<T> {
    model: T,
}

/// Serialize `model` to `path`, replacing any existing file
///
/// Encoding failures surface as `Json`; filesystem failures as `Artifact`.
pub(crate) fn write<T: Serialize>(path: &Path, model: &T) -> Result<ArtifactRecord> {
    let envelope = Envelope {
        format: ARTIFACT_FORMAT,
        version: ARTIFACT_VERSION,
        model,
    };
    let bytes = serde_json::to_vec_pretty(&envelope)?;

    let tmp = temp_path(path);
    fs::write(&tmp, &bytes).map_err(|e| {
        Error::Artifact(format!("Failed to write model artifact {}: {e}", tmp.display()))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        Error::Artifact(format!("Failed to write model artifact {}: {e}", path.display()))
    })?;

    Ok(ArtifactRecord::new(path, bytes.len() as u64))
}

/// Load and version-check the artifact at `path`
pub(crate) fn read<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => {
            Error::Artifact(format!("No model artifact at {}", path.display()))
        }
        _ => Error::Artifact(format!(
            "Failed to read model artifact {}: {e}",
            path.display()
        )),
    })?;

    let header: Header = serde_json::from_slice(&bytes).map_err(|e| {
        Error::Artifact(format!("Corrupt model artifact {}: {e}", path.display()))
    })?;
    if header.format != ARTIFACT_FORMAT {
        return Err(Error::Artifact(format!(
            "Incompatible artifact {}: format '{}', expected '{ARTIFACT_FORMAT}'",
            path.display(),
            header.format
        )));
    }
    if header.version != ARTIFACT_VERSION {
        return Err(Error::Artifact(format!(
            "Incompatible artifact {}: version {}, expected {ARTIFACT_VERSION}",
            path.display(),
            header.version
        )));
    }

    let body: Body<T> = serde_json::from_slice(&bytes).map_err(|e| {
        Error::Artifact(format!("Corrupt model artifact {}: {e}", path.display()))
    })?;
    Ok(body.model)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
