use crate::uploader::config::UploaderConfig;
use crate::uploader::digest::{ContentDigest, parse_digest_output};
use crate::uploader::util::{
    describe, ensure_success, is_shell_safe, run_with_timeout, shell_quote,
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// The three operations the engine needs from the archive host.
pub trait RemoteTransport {
    /// `mkdir -p`: succeeds when the directory already exists.
    fn ensure_dir(&self, remote_dir: &str) -> Result<()>;
    /// Content digest of a remote file. Errors when the file is absent.
    fn digest(&self, remote_path: &str) -> Result<ContentDigest>;
    /// Copy `local` over `remote_path`, preserving mtime where possible.
    fn copy_file(&self, local: &Path, remote_path: &str) -> Result<()>;
}

/// Drives `ssh`/`scp` with key-based, non-interactive authentication.
#[derive(Debug, Clone)]
pub struct SshTransport {
    ssh_bin: PathBuf,
    scp_bin: PathBuf,
    target: String,
    ssh_options: Vec<String>,
    scp_options: Vec<String>,
    digest_command: String,
    command_timeout: Duration,
    transfer_timeout: Duration,
}

fn resolve_bin(configured: &str) -> Result<PathBuf> {
    let path = Path::new(configured);
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    which::which(configured)
        .with_context(|| format!("`{configured}` not found as a file or on PATH"))
}

impl SshTransport {
    pub fn from_config(cfg: &UploaderConfig) -> Result<Self> {
        Ok(Self {
            ssh_bin: resolve_bin(&cfg.remote.ssh_bin)?,
            scp_bin: resolve_bin(&cfg.remote.scp_bin)?,
            target: cfg.remote.target(),
            ssh_options: cfg.remote.ssh_options.clone(),
            scp_options: cfg.remote.scp_options.clone(),
            digest_command: cfg.remote.digest_command.clone(),
            command_timeout: cfg.timeouts.command(),
            transfer_timeout: cfg.timeouts.transfer(),
        })
    }

    fn ssh(&self, remote_command: String) -> Command {
        let mut cmd = Command::new(&self.ssh_bin);
        cmd.args(&self.ssh_options).arg(&self.target).arg(remote_command);
        cmd
    }

    fn run(&self, mut cmd: Command, timeout: Duration) -> Result<String> {
        tracing::debug!(command = %describe(&cmd), "running remote command");
        let output = run_with_timeout(&mut cmd, timeout)?;
        tracing::debug!(
            status = %output.status,
            stdout = %String::from_utf8_lossy(&output.stdout).trim(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "remote command finished"
        );
        ensure_success(&cmd, &output)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl RemoteTransport for SshTransport {
    fn ensure_dir(&self, remote_dir: &str) -> Result<()> {
        let cmd = self.ssh(format!("mkdir -p {}", shell_quote(remote_dir)));
        self.run(cmd, self.command_timeout)
            .with_context(|| format!("mkdir -p {remote_dir} on {} failed", self.target))?;
        Ok(())
    }

    fn digest(&self, remote_path: &str) -> Result<ContentDigest> {
        let cmd = self.ssh(format!(
            "{} {}",
            self.digest_command,
            shell_quote(remote_path)
        ));
        let stdout = self
            .run(cmd, self.command_timeout)
            .with_context(|| format!("remote digest of {remote_path} failed"))?;
        parse_digest_output(&stdout)
            .with_context(|| format!("unparsable remote digest for {remote_path}"))
    }

    fn copy_file(&self, local: &Path, remote_path: &str) -> Result<()> {
        // SFTP-mode scp takes the destination literally while the legacy
        // protocol hands it to the remote shell, so neither quoting is safe
        // for both. Only paths that need no quoting are accepted.
        if !is_shell_safe(remote_path) {
            anyhow::bail!(
                "remote path {remote_path:?} contains characters scp cannot pass unambiguously"
            );
        }
        let mut cmd = Command::new(&self.scp_bin);
        cmd.arg("-p")
            .args(&self.scp_options)
            .arg(local)
            .arg(format!("{}:{remote_path}", self.target));
        self.run(cmd, self.transfer_timeout).with_context(|| {
            format!(
                "scp {} to {}:{remote_path} failed",
                local.display(),
                self.target
            )
        })?;
        Ok(())
    }
}
