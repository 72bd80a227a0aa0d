use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;

/// Hex length of a SHA-256 digest, as printed by `sha256sum`.
const DIGEST_HEX_LEN: usize = 64;

/// Lowercase hex SHA-256 of a file's bytes. Only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn parse(hex: &str) -> Result<Self> {
        let hex = hex.trim();
        if hex.len() != DIGEST_HEX_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            anyhow::bail!("not a sha256 hex digest: `{hex}`");
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the digest from `sha256sum`-style output (`<hex>  <path>`).
pub fn parse_digest_output(stdout: &str) -> Result<ContentDigest> {
    let first = stdout
        .split_whitespace()
        .next()
        .context("digest command produced no output")?;
    // GNU coreutils prefixes the hash with `\` when the path needed escaping.
    ContentDigest::parse(first.trim_start_matches('\\'))
}

pub fn digest_reader(reader: &mut impl io::Read) -> io::Result<ContentDigest> {
    let mut hasher = Sha256::new();
    io::copy(reader, &mut hasher)?;
    Ok(ContentDigest(format!("{:x}", hasher.finalize())))
}

pub fn file_digest(path: &Path) -> Result<ContentDigest> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    digest_reader(&mut file).with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const HELLO_SHA256: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    #[test]
    fn file_digest_matches_sha256sum() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("seg.mp3");
        fs::write(&path, "hello\n").expect("write");
        assert_eq!(file_digest(&path).expect("digest").as_str(), HELLO_SHA256);
    }

    #[test]
    fn file_digest_errors_for_missing_file() {
        let tmp = tempdir().expect("tempdir");
        assert!(file_digest(&tmp.path().join("nope.mp3")).is_err());
    }

    #[test]
    fn parse_digest_output_takes_first_token() {
        let out = format!("{HELLO_SHA256}  /home/pi/bmir/0800/seg1.mp3\n");
        assert_eq!(parse_digest_output(&out).expect("parse").as_str(), HELLO_SHA256);

        let escaped = format!("\\{HELLO_SHA256}  /srv/a\\nb.mp3\n");
        assert_eq!(
            parse_digest_output(&escaped).expect("parse").as_str(),
            HELLO_SHA256
        );
    }

    #[test]
    fn parse_digest_output_rejects_garbage() {
        assert!(parse_digest_output("").is_err());
        assert!(parse_digest_output("sha256sum: /x: No such file or directory").is_err());
        assert!(parse_digest_output("d41d8cd98f00b204e9800998ecf8427e  /x").is_err());
    }

    #[test]
    fn parse_normalizes_case() {
        let upper = HELLO_SHA256.to_ascii_uppercase();
        assert_eq!(
            ContentDigest::parse(&upper).expect("parse"),
            ContentDigest::parse(HELLO_SHA256).expect("parse")
        );
    }
}
