use anyhow::{Context, Result};
use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Current wall-clock time as an RFC 3339 string in UTC.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Quote `value` for a POSIX shell. `ssh` joins its trailing arguments into
/// a single remote command line, so every remote path goes through here.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// True when `value` reads the same to a POSIX shell unquoted.
pub fn is_shell_safe(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+,:@=%".contains(c))
}

/// Render a command for log lines.
pub fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().to_string()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().to_string()));
    parts.join(" ")
}

/// Read a child pipe to the end on its own thread, so a chatty child never
/// blocks on a full pipe while we poll for its exit.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn collect(reader: JoinHandle<Vec<u8>>) -> Vec<u8> {
    reader.join().unwrap_or_default()
}

/// Run `cmd` to completion, killing it once `timeout` elapses.
///
/// A timeout is an error; a non-zero exit status is not and is left for the
/// caller to interpret from the returned `Output`.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<Output> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn `{}`", describe(cmd)))?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Output {
                status,
                stdout: collect(stdout),
                stderr: collect(stderr),
            });
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            anyhow::bail!(
                "`{}` timed out after {}s",
                describe(cmd),
                timeout.as_secs()
            );
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Turn a finished process into an error unless it exited cleanly.
pub fn ensure_success(cmd: &Command, output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    anyhow::bail!(
        "`{}` exited with {}\nstdout: {}\nstderr: {}",
        describe(cmd),
        output.status,
        String::from_utf8_lossy(&output.stdout).trim(),
        String::from_utf8_lossy(&output.stderr).trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("/srv/a b"), "'/srv/a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn shell_safe_accepts_plain_paths_only() {
        assert!(is_shell_safe("/home/pi/bmir/0800/bmir.2019-0822-0800.mp3"));
        assert!(!is_shell_safe("/srv/a b/seg.mp3"));
        assert!(!is_shell_safe("/srv/$(id)/seg.mp3"));
        assert!(!is_shell_safe(""));
    }

    #[cfg(unix)]
    #[test]
    fn run_with_timeout_kills_slow_commands() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let err = run_with_timeout(&mut cmd, Duration::from_millis(200)).unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[cfg(unix)]
    #[test]
    fn run_with_timeout_keeps_large_output_flowing() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg("head -c 200000 /dev/zero >&2; head -c 100000 /dev/zero; echo done");
        let out = run_with_timeout(&mut cmd, Duration::from_secs(10)).expect("run");
        assert!(out.status.success());
        assert_eq!(out.stderr.len(), 200_000);
        assert_eq!(out.stdout.len(), 100_005);
        assert!(out.stdout.ends_with(b"done\n"));
    }

    #[cfg(unix)]
    #[test]
    fn run_with_timeout_returns_failed_output() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo oops >&2; exit 3");
        let out = run_with_timeout(&mut cmd, Duration::from_secs(5)).expect("run");
        assert!(!out.status.success());
        let err = ensure_success(&cmd, &out).unwrap_err();
        assert!(err.to_string().contains("oops"));
    }
}
