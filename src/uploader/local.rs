use crate::uploader::digest::{self, ContentDigest};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Read-only view of the local recording tree.
pub trait LocalTree {
    /// Immediate children of `dir`, sorted by name.
    fn entries(&self, dir: &Path) -> Result<Vec<LocalEntry>>;
    fn is_dir(&self, path: &Path) -> bool;
    fn digest(&self, path: &Path) -> Result<ContentDigest>;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostTree;

impl LocalTree for HostTree {
    fn entries(&self, dir: &Path) -> Result<Vec<LocalEntry>> {
        let read_dir =
            fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

        let mut out = Vec::new();
        for entry in read_dir {
            let entry = entry.with_context(|| format!("failed to read {}", dir.display()))?;
            let Ok(name) = entry.file_name().into_string() else {
                // Non UTF-8 names cannot form a manifest identifier.
                tracing::warn!(dir = %dir.display(), "skipping entry with non UTF-8 name");
                continue;
            };
            // Follows symlinks, matching how the recorder's output is laid out.
            let path = entry.path();
            let kind = if path.is_dir() {
                EntryKind::Dir
            } else if path.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };
            out.push(LocalEntry { name, kind });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn digest(&self, path: &Path) -> Result<ContentDigest> {
        digest::file_digest(path)
    }
}
