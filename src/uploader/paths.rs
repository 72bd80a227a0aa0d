use anyhow::Result;
use std::env;
use std::path::PathBuf;

pub const DEFAULT_MANIFEST_FILE: &str = "uploader.json";

#[derive(Debug, Clone)]
pub struct UploaderPaths {
    pub uploader_home: PathBuf,
    pub manifest_file: PathBuf,
    pub config_file: PathBuf,
    pub logs_dir: PathBuf,
}

impl UploaderPaths {
    pub fn audit_log(&self) -> PathBuf {
        self.logs_dir.join("audit.log")
    }
}

/// Command-line overrides, applied on top of the environment.
#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub manifest: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths(overrides: &PathOverrides) -> Result<UploaderPaths> {
    let home = required_home_dir()?;
    let uploader_home = env_or_default_path("UPLOADER_HOME", home.join(".uploader"));

    let manifest_file = match &overrides.manifest {
        Some(path) => path.clone(),
        None => env_or_default_path("UPLOADER_MANIFEST", PathBuf::from(DEFAULT_MANIFEST_FILE)),
    };
    let config_file = match &overrides.config {
        Some(path) => path.clone(),
        None => env_or_default_path(
            "UPLOADER_CONFIG_PATH",
            uploader_home.join("uploader.toml"),
        ),
    };
    let logs_dir = env_or_default_path("UPLOADER_LOGS_DIR", uploader_home.join("logs"));

    Ok(UploaderPaths {
        uploader_home,
        manifest_file,
        config_file,
        logs_dir,
    })
}

/// Join a remote base and relative parts with `/`, regardless of host OS.
pub fn remote_join(base: &str, part: &str) -> String {
    let base = base.trim_end_matches('/');
    let part = part.trim_start_matches('/');
    if base.is_empty() {
        return format!("/{part}");
    }
    format!("{base}/{part}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_join_normalizes_separators() {
        assert_eq!(remote_join("/home/pi/bmir/", "0800"), "/home/pi/bmir/0800");
        assert_eq!(remote_join("/home/pi/bmir", "/0800"), "/home/pi/bmir/0800");
        assert_eq!(remote_join("/", "0800"), "/0800");
    }

    #[test]
    fn overrides_take_precedence() {
        let overrides = PathOverrides {
            manifest: Some(PathBuf::from("/etc/uploader/state.json")),
            config: Some(PathBuf::from("/etc/uploader/uploader.toml")),
        };
        let paths = resolve_paths(&overrides).expect("paths");
        assert_eq!(
            paths.manifest_file,
            PathBuf::from("/etc/uploader/state.json")
        );
        assert_eq!(
            paths.config_file,
            PathBuf::from("/etc/uploader/uploader.toml")
        );
    }
}
