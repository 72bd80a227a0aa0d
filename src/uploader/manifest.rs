use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// On-disk shape of the manifest. Unknown top-level keys ride along in
/// `extra` so a load/save cycle never drops operator-added fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestRecord {
    local_base_dir: String,
    remote_base_dir: String,
    uploaded_files: Vec<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Reconciliation state: the two base directories plus the append-only list
/// of relative identifiers confirmed present remotely with matching content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ManifestRecord", into = "ManifestRecord")]
pub struct Manifest {
    record: ManifestRecord,
    index: HashSet<String>,
}

impl From<ManifestRecord> for Manifest {
    fn from(record: ManifestRecord) -> Self {
        let index = record.uploaded_files.iter().cloned().collect();
        Self { record, index }
    }
}

impl From<Manifest> for ManifestRecord {
    fn from(manifest: Manifest) -> Self {
        manifest.record
    }
}

impl PartialEq for Manifest {
    fn eq(&self, other: &Self) -> bool {
        self.record.local_base_dir == other.record.local_base_dir
            && self.record.remote_base_dir == other.record.remote_base_dir
            && self.record.uploaded_files == other.record.uploaded_files
            && self.record.extra == other.record.extra
    }
}

impl Manifest {
    pub fn new(local_base_dir: impl Into<String>, remote_base_dir: impl Into<String>) -> Self {
        ManifestRecord {
            local_base_dir: local_base_dir.into(),
            remote_base_dir: remote_base_dir.into(),
            uploaded_files: Vec::new(),
            extra: Map::new(),
        }
        .into()
    }

    pub fn local_base_dir(&self) -> &str {
        &self.record.local_base_dir
    }

    pub fn remote_base_dir(&self) -> &str {
        &self.record.remote_base_dir
    }

    /// Identifiers in the order they were committed.
    pub fn uploaded(&self) -> &[String] {
        &self.record.uploaded_files
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Append `id` unless already present. Returns whether it was added.
    pub fn record(&mut self, id: &str) -> bool {
        if !self.index.insert(id.to_string()) {
            return false;
        }
        self.record.uploaded_files.push(id.to_string());
        true
    }
}

/// Durable home of the manifest. `save` must be atomic: a reader sees either
/// the previous record or the new one, never a torn write.
pub trait ManifestStore {
    fn load(&self) -> Result<Manifest>;
    fn save(&self, manifest: &Manifest) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct JsonManifestStore {
    path: PathBuf,
}

impl JsonManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl ManifestStore for JsonManifestStore {
    fn load(&self) -> Result<Manifest> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read manifest {}", self.path.display()))?;
        let parsed: Manifest = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse manifest {}", self.path.display()))?;
        Ok(parsed)
    }

    fn save(&self, manifest: &Manifest) -> Result<()> {
        let dir = self.parent_dir();
        let data = serde_json::to_string_pretty(manifest)?;
        let mut tmp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        tmp.write_all(format!("{data}\n").as_bytes())
            .with_context(|| format!("failed to write temp file in {}", dir.display()))?;
        tmp.as_file()
            .sync_all()
            .with_context(|| format!("failed to sync temp file in {}", dir.display()))?;
        tmp.persist(&self.path)
            .with_context(|| format!("failed to replace manifest {}", self.path.display()))?;
        Ok(())
    }
}
