use anyhow::Result;

use crate::commands::CommandReport;
use crate::error::{UploadError, reason};
use crate::logging;
use crate::uploader::audit::AuditLog;
use crate::uploader::config::{UploaderConfig, load_config};
use crate::uploader::engine::{Reconciler, plan};
use crate::uploader::local::HostTree;
use crate::uploader::manifest::JsonManifestStore;
use crate::uploader::paths::{PathOverrides, UploaderPaths, resolve_paths};
use crate::uploader::remote::SshTransport;

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Stem of the segment currently being recorded, e.g. `bmir.2019-0822-0000`.
    pub recording: Option<String>,
    pub dry_run: bool,
    pub paths: PathOverrides,
}

fn prepare(opts: &UploadOptions) -> Result<(UploaderPaths, UploaderConfig)> {
    let paths = resolve_paths(&opts.paths).map_err(|err| UploadError::Config(reason(&err)))?;
    let cfg = load_config(&paths.config_file).map_err(|err| UploadError::Config(reason(&err)))?;
    logging::init(&cfg.log);
    Ok((paths, cfg))
}

pub fn run(opts: &UploadOptions) -> Result<CommandReport> {
    let (paths, cfg) = prepare(opts)?;
    let mut report = CommandReport::new("upload");
    let recording = opts.recording.as_deref();
    let store = JsonManifestStore::new(&paths.manifest_file);
    let tree = HostTree;

    report.detail(format!("manifest={}", paths.manifest_file.display()));
    report.detail(format!("recording={}", recording.unwrap_or("-")));

    if opts.dry_run {
        let (manifest, pending) = plan(&tree, &store, &cfg.scan.media_suffix, recording)?;
        report.detail(format!("local_base_dir={}", manifest.local_base_dir()));
        report.detail(format!("remote_base_dir={}", manifest.remote_base_dir()));
        report.detail(format!("pending={}", pending.len()));
        for candidate in pending {
            report.detail(format!("pending.file={}", candidate.id));
        }
        return Ok(report);
    }

    let transport =
        SshTransport::from_config(&cfg).map_err(|err| UploadError::Config(reason(&err)))?;
    let audit = if cfg.log.audit {
        AuditLog::new(paths.audit_log())
    } else {
        AuditLog::disabled()
    };

    let summary = Reconciler::new(&tree, &transport, &store, cfg.scan.media_suffix.clone())
        .with_audit(audit)
        .run(recording)?;

    report.detail(format!("remote={}", cfg.remote.target()));
    report.detail(format!("scanned={}", summary.scanned));
    report.detail(format!("skipped.not_file={}", summary.skipped_not_file));
    report.detail(format!("skipped.suffix={}", summary.skipped_suffix));
    report.detail(format!("skipped.recording={}", summary.skipped_recording));
    report.detail(format!("skipped.uploaded={}", summary.skipped_uploaded));
    report.detail(format!("uploaded={}", summary.uploaded));
    report.detail(format!("already_satisfied={}", summary.already_satisfied));
    for id in &summary.committed {
        report.detail(format!("committed.file={id}"));
    }

    Ok(report)
}
