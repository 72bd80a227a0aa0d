use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(
    uploader_home: Option<PathBuf>,
    home_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(base) = uploader_home {
        return Some(base.join(".env"));
    }
    Some(home_dir?.join(".uploader/.env"))
}

/// Cron runs with a bare environment, so settings may live in a `.env` file
/// next to the invocation directory or under the uploader home.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("UPLOADER_HOME").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}
