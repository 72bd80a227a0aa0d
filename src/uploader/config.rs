use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub user: String,
    pub host: String,
    pub ssh_bin: String,
    pub scp_bin: String,
    pub digest_command: String,
    pub ssh_options: Vec<String>,
    /// Passed to `scp` instead of `ssh_options`; the two disagree on flags
    /// such as the port (`-p` vs `-P`).
    pub scp_options: Vec<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            user: "pi".to_string(),
            host: "dobmir".to_string(),
            ssh_bin: "ssh".to_string(),
            scp_bin: "scp".to_string(),
            digest_command: "sha256sum".to_string(),
            ssh_options: vec!["-o".to_string(), "BatchMode=yes".to_string()],
            scp_options: vec!["-o".to_string(), "BatchMode=yes".to_string()],
        }
    }
}

impl RemoteConfig {
    /// `user@host`, or just `host` when no user is configured.
    pub fn target(&self) -> String {
        if self.user.trim().is_empty() {
            self.host.clone()
        } else {
            format!("{}@{}", self.user, self.host)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub command_secs: u64,
    pub transfer_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_secs: 60,
            transfer_secs: 1800,
        }
    }
}

impl TimeoutConfig {
    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    pub fn transfer(&self) -> Duration {
        Duration::from_secs(self.transfer_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub media_suffix: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            media_suffix: ".mp3".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub audit: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            audit: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UploaderConfig {
    pub remote: RemoteConfig,
    pub timeouts: TimeoutConfig,
    pub scan: ScanConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialUploaderConfig {
    remote: Option<RemoteConfig>,
    timeouts: Option<TimeoutConfig>,
    scan: Option<ScanConfig>,
    log: Option<LogConfig>,
}

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => {
            let trimmed = v.trim();
            match trimmed {
                "1" | "true" | "TRUE" | "yes" | "on" => true,
                "0" | "false" | "FALSE" | "no" | "off" => false,
                _ => fallback,
            }
        }
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn validate(cfg: &UploaderConfig) -> Result<()> {
    if cfg.remote.host.trim().is_empty() {
        return Err(anyhow!("invalid remote host: cannot be empty"));
    }
    if cfg.remote.ssh_bin.trim().is_empty() || cfg.remote.scp_bin.trim().is_empty() {
        return Err(anyhow!("invalid remote binaries: ssh_bin and scp_bin are required"));
    }
    if cfg.remote.digest_command.trim().is_empty() {
        return Err(anyhow!("invalid remote digest command: cannot be empty"));
    }
    if cfg.timeouts.command_secs == 0 {
        return Err(anyhow!("invalid command timeout: must be >= 1 second"));
    }
    if cfg.timeouts.transfer_secs == 0 {
        return Err(anyhow!("invalid transfer timeout: must be >= 1 second"));
    }
    let suffix = &cfg.scan.media_suffix;
    if !suffix.starts_with('.') || suffix.len() < 2 {
        return Err(anyhow!(
            "invalid media suffix `{suffix}`: must start with `.`, e.g. `.mp3`"
        ));
    }
    if !LOG_LEVELS.contains(&cfg.log.level.as_str()) {
        return Err(anyhow!(
            "invalid log level `{}`: use one of {}",
            cfg.log.level,
            LOG_LEVELS.join(", ")
        ));
    }
    Ok(())
}

fn merge_file_config(base: &mut UploaderConfig, raw: &str, path: &Path) -> Result<()> {
    let parsed: PartialUploaderConfig = toml::from_str(raw)
        .map_err(|err| anyhow!("failed to parse uploader config {}: {err}", path.display()))?;
    if let Some(remote) = parsed.remote {
        base.remote = remote;
    }
    if let Some(timeouts) = parsed.timeouts {
        base.timeouts = timeouts;
    }
    if let Some(scan) = parsed.scan {
        base.scan = scan;
    }
    if let Some(log) = parsed.log {
        base.log = log;
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut UploaderConfig) {
    cfg.remote.user = env_or_string("UPLOADER_REMOTE_USER", &cfg.remote.user);
    cfg.remote.host = env_or_string("UPLOADER_REMOTE_HOST", &cfg.remote.host);
    cfg.remote.ssh_bin = env_or_string("UPLOADER_SSH_BIN", &cfg.remote.ssh_bin);
    cfg.remote.scp_bin = env_or_string("UPLOADER_SCP_BIN", &cfg.remote.scp_bin);
    cfg.remote.digest_command =
        env_or_string("UPLOADER_DIGEST_COMMAND", &cfg.remote.digest_command);
    cfg.timeouts.command_secs =
        env_or_u64("UPLOADER_COMMAND_TIMEOUT_SECS", cfg.timeouts.command_secs);
    cfg.timeouts.transfer_secs =
        env_or_u64("UPLOADER_TRANSFER_TIMEOUT_SECS", cfg.timeouts.transfer_secs);
    cfg.scan.media_suffix = env_or_string("UPLOADER_MEDIA_SUFFIX", &cfg.scan.media_suffix);
    cfg.log.level = env_or_string("UPLOADER_LOG_LEVEL", &cfg.log.level).to_ascii_lowercase();
    cfg.log.audit = env_or_bool("UPLOADER_AUDIT", cfg.log.audit);
}

/// Defaults, then the TOML file at `path` if it exists, then `UPLOADER_*`
/// environment overrides.
pub fn load_config(path: &Path) -> Result<UploaderConfig> {
    let mut cfg = UploaderConfig::default();
    if path.exists() {
        let raw = fs::read_to_string(path)
            .map_err(|err| anyhow!("failed to read uploader config {}: {err}", path.display()))?;
        merge_file_config(&mut cfg, &raw, path)?;
    }
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}
