use crate::error::{UploadError, reason};
use crate::uploader::audit::AuditLog;
use crate::uploader::digest::ContentDigest;
use crate::uploader::local::{EntryKind, LocalEntry, LocalTree};
use crate::uploader::manifest::{Manifest, ManifestStore};
use crate::uploader::paths::remote_join;
use crate::uploader::remote::RemoteTransport;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A local file considered for upload during one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub subdir: String,
    pub file_name: String,
    /// `<subdir>/<file_name>`, the unit recorded in the manifest.
    pub id: String,
    pub local_path: PathBuf,
}

impl Candidate {
    fn new(base: &Path, subdir: &str, file_name: &str) -> Self {
        Self {
            subdir: subdir.to_string(),
            file_name: file_name.to_string(),
            id: format!("{subdir}/{file_name}"),
            local_path: base.join(subdir).join(file_name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferStatus {
    /// The remote copy already matched; nothing was sent.
    AlreadySatisfied,
    UploadedAndVerified,
}

impl TransferStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlreadySatisfied => "already-satisfied",
            Self::UploadedAndVerified => "uploaded-and-verified",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub local_digest: ContentDigest,
    /// Remote digest before any transfer; `None` when it could not be computed.
    pub remote_before: Option<ContentDigest>,
    pub remote_digest: ContentDigest,
    pub status: TransferStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub scanned: usize,
    pub skipped_not_file: usize,
    pub skipped_suffix: usize,
    pub skipped_recording: usize,
    pub skipped_uploaded: usize,
    pub uploaded: usize,
    pub already_satisfied: usize,
    /// Identifiers added to the manifest during this run, in commit order.
    pub committed: Vec<String>,
}

fn load_manifest(
    store: &dyn ManifestStore,
    local: &dyn LocalTree,
) -> Result<Manifest, UploadError> {
    let manifest = store
        .load()
        .map_err(|err| UploadError::Config(reason(&err)))?;
    let base = Path::new(manifest.local_base_dir());
    if !local.is_dir(base) {
        return Err(UploadError::Config(format!(
            "local base directory does not exist: {}",
            base.display()
        )));
    }
    Ok(manifest)
}

fn scan(local: &dyn LocalTree, dir: &Path) -> Result<Vec<LocalEntry>, UploadError> {
    local.entries(dir).map_err(|err| UploadError::LocalScan {
        path: dir.display().to_string(),
        reason: reason(&err),
    })
}

/// Walk `<base>/<subdir>/<file>` and apply the filter step, returning the
/// candidates that still need the upload protocol, in enumeration order.
fn collect_candidates(
    local: &dyn LocalTree,
    manifest: &Manifest,
    media_suffix: &str,
    recording: Option<&str>,
    summary: &mut RunSummary,
) -> Result<Vec<Candidate>, UploadError> {
    let base = Path::new(manifest.local_base_dir());
    let recording_name = recording.map(|stem| format!("{stem}{media_suffix}"));
    let mut out = Vec::new();

    for dir in scan(local, base)? {
        if dir.kind != EntryKind::Dir {
            tracing::debug!(name = %dir.name, "not a directory, skipping");
            continue;
        }
        for entry in scan(local, &base.join(&dir.name))? {
            summary.scanned += 1;
            let candidate = Candidate::new(base, &dir.name, &entry.name);

            if entry.kind != EntryKind::File {
                tracing::debug!(id = %candidate.id, "not a file, skipping");
                summary.skipped_not_file += 1;
                continue;
            }
            if !entry.name.ends_with(media_suffix) {
                tracing::debug!(id = %candidate.id, "not a media file, skipping");
                summary.skipped_suffix += 1;
                continue;
            }
            if recording_name.as_deref() == Some(entry.name.as_str()) {
                tracing::info!(id = %candidate.id, "skipping file still being recorded");
                summary.skipped_recording += 1;
                continue;
            }
            if manifest.contains(&candidate.id) {
                tracing::debug!(id = %candidate.id, "already uploaded");
                summary.skipped_uploaded += 1;
                continue;
            }
            out.push(candidate);
        }
    }

    Ok(out)
}

/// Filter step only: the candidates the next run would process. Makes no
/// remote calls and never writes the manifest.
pub fn plan(
    local: &dyn LocalTree,
    store: &dyn ManifestStore,
    media_suffix: &str,
    recording: Option<&str>,
) -> Result<(Manifest, Vec<Candidate>), UploadError> {
    let manifest = load_manifest(store, local)?;
    let mut summary = RunSummary::default();
    let pending = collect_candidates(local, &manifest, media_suffix, recording, &mut summary)?;
    Ok((manifest, pending))
}

/// Walks the local tree and drives the upload-and-verify protocol one file at
/// a time, persisting the manifest after every committed file. The first
/// failure stops the run.
pub struct Reconciler<'a> {
    local: &'a dyn LocalTree,
    remote: &'a dyn RemoteTransport,
    store: &'a dyn ManifestStore,
    audit: AuditLog,
    media_suffix: String,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        local: &'a dyn LocalTree,
        remote: &'a dyn RemoteTransport,
        store: &'a dyn ManifestStore,
        media_suffix: impl Into<String>,
    ) -> Self {
        Self {
            local,
            remote,
            store,
            audit: AuditLog::disabled(),
            media_suffix: media_suffix.into(),
        }
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    /// One full reconciliation pass. `recording` is the stem of the file
    /// currently being written, which must not be touched.
    pub fn run(&self, recording: Option<&str>) -> Result<RunSummary, UploadError> {
        match self.reconcile(recording) {
            Ok(summary) => Ok(summary),
            Err(err) => {
                tracing::error!(
                    code = err.code().as_str(),
                    step = err.step(),
                    id = err.file_id().unwrap_or("-"),
                    "run aborted: {err}"
                );
                self.audit
                    .record(err.file_id().unwrap_or("-"), "failed", &err.to_string());
                Err(err)
            }
        }
    }

    fn reconcile(&self, recording: Option<&str>) -> Result<RunSummary, UploadError> {
        let mut manifest = load_manifest(self.store, self.local)?;
        let mut summary = RunSummary::default();
        tracing::info!(
            local_base_dir = manifest.local_base_dir(),
            remote_base_dir = manifest.remote_base_dir(),
            uploaded = manifest.uploaded().len(),
            recording = recording.unwrap_or("-"),
            "starting reconciliation"
        );

        let pending = collect_candidates(
            self.local,
            &manifest,
            &self.media_suffix,
            recording,
            &mut summary,
        )?;
        for candidate in pending {
            tracing::info!(id = %candidate.id, "uploading");
            let outcome = self.transfer(&manifest, &candidate)?;
            self.commit(&mut manifest, &candidate, &outcome)?;
            match outcome.status {
                TransferStatus::AlreadySatisfied => summary.already_satisfied += 1,
                TransferStatus::UploadedAndVerified => summary.uploaded += 1,
            }
            summary.committed.push(candidate.id);
        }

        tracing::info!(
            scanned = summary.scanned,
            uploaded = summary.uploaded,
            already_satisfied = summary.already_satisfied,
            "reconciliation finished"
        );
        Ok(summary)
    }

    fn transfer(
        &self,
        manifest: &Manifest,
        candidate: &Candidate,
    ) -> Result<TransferOutcome, UploadError> {
        let remote_dir = remote_join(manifest.remote_base_dir(), &candidate.subdir);
        let remote_path = remote_join(&remote_dir, &candidate.file_name);

        self.remote
            .ensure_dir(&remote_dir)
            .map_err(|err| UploadError::RemotePrepare {
                id: candidate.id.clone(),
                remote_dir: remote_dir.clone(),
                reason: reason(&err),
            })?;

        let local_digest =
            self.local
                .digest(&candidate.local_path)
                .map_err(|err| UploadError::LocalDigest {
                    id: candidate.id.clone(),
                    reason: reason(&err),
                })?;
        tracing::debug!(id = %candidate.id, digest = %local_digest, "local digest");

        // A failed remote digest usually means the file is not there yet, but
        // transient ssh failures land here too and are treated the same way.
        let remote_before = match self.remote.digest(&remote_path) {
            Ok(digest) => Some(digest),
            Err(err) => {
                tracing::debug!(id = %candidate.id, "no remote digest: {err:#}");
                None
            }
        };

        if remote_before.as_ref() == Some(&local_digest) {
            tracing::info!(id = %candidate.id, "remote copy already matches");
            return Ok(TransferOutcome {
                remote_digest: local_digest.clone(),
                local_digest,
                remote_before,
                status: TransferStatus::AlreadySatisfied,
            });
        }

        tracing::info!(
            id = %candidate.id,
            remote = %remote_path,
            "remote copy missing or different, transferring"
        );
        self.remote
            .copy_file(&candidate.local_path, &remote_path)
            .map_err(|err| UploadError::Transfer {
                id: candidate.id.clone(),
                remote_path: remote_path.clone(),
                reason: reason(&err),
            })?;

        let remote_digest =
            self.remote
                .digest(&remote_path)
                .map_err(|err| UploadError::RemoteVerify {
                    id: candidate.id.clone(),
                    reason: reason(&err),
                })?;
        tracing::debug!(id = %candidate.id, digest = %remote_digest, "remote digest after upload");

        if remote_digest != local_digest {
            return Err(UploadError::DigestMismatch {
                id: candidate.id.clone(),
                local: local_digest.to_string(),
                remote: remote_digest.to_string(),
            });
        }

        Ok(TransferOutcome {
            local_digest,
            remote_before,
            remote_digest,
            status: TransferStatus::UploadedAndVerified,
        })
    }

    fn commit(
        &self,
        manifest: &mut Manifest,
        candidate: &Candidate,
        outcome: &TransferOutcome,
    ) -> Result<(), UploadError> {
        manifest.record(&candidate.id);
        self.store
            .save(manifest)
            .map_err(|err| UploadError::ManifestPersist {
                id: candidate.id.clone(),
                reason: reason(&err),
            })?;
        tracing::info!(
            id = %candidate.id,
            status = outcome.status.as_str(),
            digest = %outcome.local_digest,
            replaced = outcome.remote_before.is_some(),
            "recorded in manifest"
        );
        self.audit.record(
            &candidate.id,
            outcome.status.as_str(),
            &format!("sha256={}", outcome.remote_digest),
        );
        Ok(())
    }
}
