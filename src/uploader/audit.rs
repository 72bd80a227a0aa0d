use crate::uploader::util::now_rfc3339;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub at: String,
    pub id: String,
    pub status: String,
    pub message: String,
}

/// Append-only JSON-lines record of committed uploads and aborted runs.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: Option<PathBuf>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Never fails the caller; a broken audit log only costs a warning.
    pub fn record(&self, id: &str, status: &str, message: &str) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(err) = append_event(path, id, status, message) {
            tracing::warn!(path = %path.display(), "audit append failed: {err:#}");
        }
    }
}

fn append_event(path: &Path, id: &str, status: &str, message: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let event = AuditEvent {
        at: now_rfc3339(),
        id: id.to_string(),
        status: status.to_string(),
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}
