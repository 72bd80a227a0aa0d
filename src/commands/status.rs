use anyhow::Result;

use crate::commands::CommandReport;
use crate::uploader::config::load_config;
use crate::uploader::engine::plan;
use crate::uploader::local::HostTree;
use crate::uploader::manifest::{JsonManifestStore, ManifestStore};
use crate::uploader::paths::{PathOverrides, resolve_paths};

pub fn run(overrides: &PathOverrides) -> Result<CommandReport> {
    let paths = resolve_paths(overrides)?;
    let mut report = CommandReport::new("status");

    report.detail(format!("uploader_home={}", paths.uploader_home.display()));
    report.detail(format!("manifest_file={}", paths.manifest_file.display()));
    report.detail(format!("config_file={}", paths.config_file.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));

    let cfg = match load_config(&paths.config_file) {
        Ok(cfg) => {
            report.detail(format!("remote={}", cfg.remote.target()));
            report.detail(format!("media_suffix={}", cfg.scan.media_suffix));
            report.detail(format!(
                "timeouts.command_secs={} timeouts.transfer_secs={}",
                cfg.timeouts.command_secs, cfg.timeouts.transfer_secs
            ));
            Some(cfg)
        }
        Err(err) => {
            report.issue(format!("config invalid: {err:#}"));
            None
        }
    };

    let store = JsonManifestStore::new(&paths.manifest_file);
    if !store.path().exists() {
        report.issue(format!(
            "missing manifest ({}); create it with local_base_dir, remote_base_dir and uploaded_files",
            store.path().display()
        ));
        return Ok(report);
    }
    let manifest = match store.load() {
        Ok(manifest) => manifest,
        Err(err) => {
            report.issue(format!("manifest unreadable: {err:#}"));
            return Ok(report);
        }
    };
    report.detail(format!("local_base_dir={}", manifest.local_base_dir()));
    report.detail(format!("remote_base_dir={}", manifest.remote_base_dir()));
    report.detail(format!("uploaded={}", manifest.uploaded().len()));

    let Some(cfg) = cfg else {
        return Ok(report);
    };
    match plan(&HostTree, &store, &cfg.scan.media_suffix, None) {
        Ok((_, pending)) => report.detail(format!("pending={}", pending.len())),
        Err(err) => report.issue(err.to_string()),
    }

    Ok(report)
}
