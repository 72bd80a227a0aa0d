use thiserror::Error;

/// Failures that end a reconciliation run.
///
/// Every variant other than `Config` is raised mid-run and leaves the
/// manifest at the state persisted after the last committed file.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("failed to scan local tree at {path}: {reason}")]
    LocalScan { path: String, reason: String },
    #[error("could not create remote directory {remote_dir} for {id}: {reason}")]
    RemotePrepare {
        id: String,
        remote_dir: String,
        reason: String,
    },
    #[error("could not compute local digest for {id}: {reason}")]
    LocalDigest { id: String, reason: String },
    #[error("could not upload {id} to {remote_path}: {reason}")]
    Transfer {
        id: String,
        remote_path: String,
        reason: String,
    },
    #[error("could not compute remote digest for {id} after upload: {reason}")]
    RemoteVerify { id: String, reason: String },
    #[error("digest mismatch for {id}: local={local} remote={remote}")]
    DigestMismatch {
        id: String,
        local: String,
        remote: String,
    },
    #[error("could not persist manifest after uploading {id}: {reason}")]
    ManifestPersist { id: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadErrorCode {
    E101Config,
    E102LocalScan,
    E201RemotePrepare,
    E202LocalDigest,
    E203Transfer,
    E204RemoteVerify,
    E205DigestMismatch,
    E301ManifestPersist,
}

impl UploadErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E101Config => "E101_CONFIG",
            Self::E102LocalScan => "E102_LOCAL_SCAN",
            Self::E201RemotePrepare => "E201_REMOTE_PREPARE",
            Self::E202LocalDigest => "E202_LOCAL_DIGEST",
            Self::E203Transfer => "E203_TRANSFER",
            Self::E204RemoteVerify => "E204_REMOTE_VERIFY",
            Self::E205DigestMismatch => "E205_DIGEST_MISMATCH",
            Self::E301ManifestPersist => "E301_MANIFEST_PERSIST",
        }
    }
}

impl UploadError {
    pub fn code(&self) -> UploadErrorCode {
        match self {
            Self::Config(_) => UploadErrorCode::E101Config,
            Self::LocalScan { .. } => UploadErrorCode::E102LocalScan,
            Self::RemotePrepare { .. } => UploadErrorCode::E201RemotePrepare,
            Self::LocalDigest { .. } => UploadErrorCode::E202LocalDigest,
            Self::Transfer { .. } => UploadErrorCode::E203Transfer,
            Self::RemoteVerify { .. } => UploadErrorCode::E204RemoteVerify,
            Self::DigestMismatch { .. } => UploadErrorCode::E205DigestMismatch,
            Self::ManifestPersist { .. } => UploadErrorCode::E301ManifestPersist,
        }
    }

    /// Protocol step that failed, for structured log fields.
    pub fn step(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::LocalScan { .. } => "scan",
            Self::RemotePrepare { .. } => "prepare",
            Self::LocalDigest { .. } => "local-digest",
            Self::Transfer { .. } => "transfer",
            Self::RemoteVerify { .. } | Self::DigestMismatch { .. } => "verify",
            Self::ManifestPersist { .. } => "commit",
        }
    }

    /// Relative identifier of the file being processed, if the failure is tied to one.
    pub fn file_id(&self) -> Option<&str> {
        match self {
            Self::Config(_) | Self::LocalScan { .. } => None,
            Self::RemotePrepare { id, .. }
            | Self::LocalDigest { id, .. }
            | Self::Transfer { id, .. }
            | Self::RemoteVerify { id, .. }
            | Self::DigestMismatch { id, .. }
            | Self::ManifestPersist { id, .. } => Some(id),
        }
    }
}

/// Flattens an `anyhow` chain into a single line for error payloads.
pub fn reason(err: &anyhow::Error) -> String {
    format!("{err:#}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let err = UploadError::DigestMismatch {
            id: "0800/a.mp3".into(),
            local: "aa".into(),
            remote: "bb".into(),
        };
        assert_eq!(err.code().as_str(), "E205_DIGEST_MISMATCH");
        assert_eq!(err.file_id(), Some("0800/a.mp3"));
        assert!(UploadError::Config("x".into()).file_id().is_none());
    }

    #[test]
    fn steps_name_the_failed_protocol_stage() {
        let transfer = UploadError::Transfer {
            id: "0800/a.mp3".into(),
            remote_path: "/r/0800/a.mp3".into(),
            reason: "lost connection".into(),
        };
        assert_eq!(transfer.step(), "transfer");
        let verify = UploadError::RemoteVerify {
            id: "0800/a.mp3".into(),
            reason: "timed out".into(),
        };
        assert_eq!(verify.step(), "verify");
        assert_eq!(UploadError::Config("x".into()).step(), "config");
    }

    #[test]
    fn reason_includes_context_chain() {
        let err = anyhow::anyhow!("exit status 1").context("ssh mkdir failed");
        assert_eq!(reason(&err), "ssh mkdir failed: exit status 1");
    }
}
