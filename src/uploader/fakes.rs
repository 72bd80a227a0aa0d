//! In-memory collaborators for engine tests.

use crate::uploader::digest::{ContentDigest, digest_reader};
use crate::uploader::local::{EntryKind, LocalEntry, LocalTree};
use crate::uploader::manifest::{Manifest, ManifestStore};
use crate::uploader::remote::RemoteTransport;
use anyhow::Result;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

fn digest_of(bytes: &[u8]) -> ContentDigest {
    let mut reader = bytes;
    match digest_reader(&mut reader) {
        Ok(digest) => digest,
        Err(err) => panic!("hashing an in-memory buffer cannot fail: {err}"),
    }
}

#[derive(Default)]
struct Failures {
    mkdir: bool,
    local_digest: BTreeSet<PathBuf>,
    remote_digest: bool,
    copy: BTreeSet<String>,
    corrupt_copies: bool,
}

/// A local tree and a remote host in one place, recording every call the
/// engine makes against either.
pub struct FakeWorld {
    base: PathBuf,
    local: RefCell<BTreeMap<PathBuf, Vec<u8>>>,
    remote: RefCell<BTreeMap<String, Vec<u8>>>,
    remote_dirs: RefCell<BTreeSet<String>>,
    calls: RefCell<Vec<String>>,
    failures: RefCell<Failures>,
}

impl FakeWorld {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            local: RefCell::new(BTreeMap::new()),
            remote: RefCell::new(BTreeMap::new()),
            remote_dirs: RefCell::new(BTreeSet::new()),
            calls: RefCell::new(Vec::new()),
            failures: RefCell::new(Failures::default()),
        }
    }

    /// Add a file at `relative` below the base directory.
    pub fn add_local(&self, relative: &str, bytes: &[u8]) {
        self.local
            .borrow_mut()
            .insert(self.base.join(relative), bytes.to_vec());
    }

    pub fn add_remote(&self, path: &str, bytes: &[u8]) {
        self.remote
            .borrow_mut()
            .insert(path.to_string(), bytes.to_vec());
    }

    pub fn remote_content(&self, path: &str) -> Option<Vec<u8>> {
        self.remote.borrow().get(path).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn fail_mkdir(&self) {
        self.failures.borrow_mut().mkdir = true;
    }

    pub fn fail_local_digest(&self, path: &str) {
        self.failures
            .borrow_mut()
            .local_digest
            .insert(PathBuf::from(path));
    }

    pub fn fail_remote_digest(&self) {
        self.failures.borrow_mut().remote_digest = true;
    }

    pub fn fail_copy_to(&self, remote_path: &str) {
        self.failures
            .borrow_mut()
            .copy
            .insert(remote_path.to_string());
    }

    pub fn corrupt_copies(&self) {
        self.failures.borrow_mut().corrupt_copies = true;
    }

    fn call(&self, line: String) {
        self.calls.borrow_mut().push(line);
    }
}

impl LocalTree for FakeWorld {
    fn entries(&self, dir: &Path) -> Result<Vec<LocalEntry>> {
        if !self.is_dir(dir) {
            anyhow::bail!("no such directory: {}", dir.display());
        }
        let mut children: BTreeMap<String, EntryKind> = BTreeMap::new();
        for path in self.local.borrow().keys() {
            let Ok(rest) = path.strip_prefix(dir) else {
                continue;
            };
            let mut components = rest.components();
            let Some(first) = components.next() else {
                continue;
            };
            let kind = if components.next().is_some() {
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            let name = first.as_os_str().to_string_lossy().to_string();
            children.insert(name, kind);
        }
        Ok(children
            .into_iter()
            .map(|(name, kind)| LocalEntry { name, kind })
            .collect())
    }

    fn is_dir(&self, path: &Path) -> bool {
        if path == self.base {
            return true;
        }
        self.local
            .borrow()
            .keys()
            .any(|file| file != path && file.starts_with(path))
    }

    fn digest(&self, path: &Path) -> Result<ContentDigest> {
        self.call(format!("local-digest {}", path.display()));
        if self.failures.borrow().local_digest.contains(path) {
            anyhow::bail!("permission denied: {}", path.display());
        }
        let local = self.local.borrow();
        let Some(bytes) = local.get(path) else {
            anyhow::bail!("no such file: {}", path.display());
        };
        Ok(digest_of(bytes))
    }
}

impl RemoteTransport for FakeWorld {
    fn ensure_dir(&self, remote_dir: &str) -> Result<()> {
        self.call(format!("mkdir {remote_dir}"));
        if self.failures.borrow().mkdir {
            anyhow::bail!("ssh: connect to host dobmir port 22: Connection refused");
        }
        self.remote_dirs.borrow_mut().insert(remote_dir.to_string());
        Ok(())
    }

    fn digest(&self, remote_path: &str) -> Result<ContentDigest> {
        self.call(format!("digest {remote_path}"));
        if self.failures.borrow().remote_digest {
            anyhow::bail!("ssh: Connection reset by peer");
        }
        let remote = self.remote.borrow();
        let Some(bytes) = remote.get(remote_path) else {
            anyhow::bail!("sha256sum: {remote_path}: No such file or directory");
        };
        Ok(digest_of(bytes))
    }

    fn copy_file(&self, local: &Path, remote_path: &str) -> Result<()> {
        self.call(format!("copy {} {remote_path}", local.display()));
        let failures = self.failures.borrow();
        if failures.copy.contains(remote_path) {
            anyhow::bail!("scp: lost connection");
        }
        let Some(mut bytes) = self.local.borrow().get(local).cloned() else {
            anyhow::bail!("scp: {}: No such file or directory", local.display());
        };
        if failures.corrupt_copies {
            bytes.push(0);
        }
        self.remote
            .borrow_mut()
            .insert(remote_path.to_string(), bytes);
        Ok(())
    }
}

/// Manifest store that keeps the last saved record in memory.
pub struct MemoryManifestStore {
    current: RefCell<Manifest>,
    saves: Cell<usize>,
    fail_saves: Cell<bool>,
}

impl MemoryManifestStore {
    pub fn new(manifest: Manifest) -> Self {
        Self {
            current: RefCell::new(manifest),
            saves: Cell::new(0),
            fail_saves: Cell::new(false),
        }
    }

    pub fn current(&self) -> Manifest {
        self.current.borrow().clone()
    }

    pub fn saves(&self) -> usize {
        self.saves.get()
    }

    pub fn fail_saves(&self) {
        self.fail_saves.set(true);
    }
}

impl ManifestStore for MemoryManifestStore {
    fn load(&self) -> Result<Manifest> {
        Ok(self.current())
    }

    fn save(&self, manifest: &Manifest) -> Result<()> {
        if self.fail_saves.get() {
            anyhow::bail!("No space left on device");
        }
        *self.current.borrow_mut() = manifest.clone();
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}
