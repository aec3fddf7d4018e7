//! Stable identities for output files
//!
//! A local path is identified by the device and inode of the file it
//! ultimately points at, so a hardlink, a symlink and the original path all
//! map to one identity. Values that are already remote URIs are their own
//! identity.

use crate::errors::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::Path;

static REMOTE_URI: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+://").expect("valid regex"));

/// Whether `value` is a remote URI (`scheme://...`) rather than a local path
pub fn is_remote_uri(value: &str) -> bool {
    REMOTE_URI.is_match(value)
}

/// Canonical identity of a file or directory value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileIdentity {
    /// Local file system entry, after following symlinks
    Inode { device: u64, inode: u64 },
    /// Canonical path, used where inode numbers are unavailable
    Canonical(std::path::PathBuf),
    /// Value that already names a remote object
    Remote(String),
}

impl FileIdentity {
    /// Resolve the identity of a path or URI.
    ///
    /// A path that does not exist or cannot be stat'ed is an error: callers
    /// only resolve declared task outputs, which must exist.
    pub fn resolve(value: &str) -> Result<Self> {
        if is_remote_uri(value) {
            return Ok(FileIdentity::Remote(value.to_string()));
        }

        let path = Path::new(value);
        let real = path
            .canonicalize()
            .map_err(|e| Error::file_system(path, "resolve symlinks", e))?;

        Self::stat(&real)
    }

    #[cfg(unix)]
    fn stat(real: &Path) -> Result<Self> {
        use std::os::unix::fs::MetadataExt;

        let metadata = std::fs::metadata(real)
            .map_err(|e| Error::file_system(real, "stat", e))?;
        Ok(FileIdentity::Inode {
            device: metadata.dev(),
            inode: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    fn stat(real: &Path) -> Result<Self> {
        std::fs::metadata(real).map_err(|e| Error::file_system(real, "stat", e))?;
        Ok(FileIdentity::Canonical(real.to_path_buf()))
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileIdentity::Inode { device, inode } => write!(f, "({device}, {inode})"),
            FileIdentity::Canonical(path) => write!(f, "{}", path.display()),
            FileIdentity::Remote(uri) => f.write_str(uri),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    #[rstest]
    #[case::s3("s3://bucket/key.txt", true)]
    #[case::https("https://example.com/a", true)]
    #[case::absolute("/tmp/out.txt", false)]
    #[case::relative("out/x/file.txt", false)]
    #[case::scheme_without_slashes("s3:bucket", false)]
    fn test_remote_uri_detection(#[case] value: &str, #[case] expected: bool) {
        assert_eq!(is_remote_uri(value), expected);
    }

    #[test]
    fn test_remote_values_are_their_own_identity() {
        let id = FileIdentity::resolve("s3://bucket/a/b.txt").unwrap();
        assert_eq!(id, FileIdentity::Remote("s3://bucket/a/b.txt".to_string()));
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.txt");
        let err = FileIdentity::resolve(missing.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, Error::FileSystem { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_links_share_identity() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("original.txt");
        fs::write(&original, "hello\n").unwrap();

        let hard = temp_dir.path().join("hard.txt");
        fs::hard_link(&original, &hard).unwrap();
        let soft = temp_dir.path().join("soft.txt");
        std::os::unix::fs::symlink(&original, &soft).unwrap();

        let id = FileIdentity::resolve(original.to_str().unwrap()).unwrap();
        assert_eq!(FileIdentity::resolve(hard.to_str().unwrap()).unwrap(), id);
        assert_eq!(FileIdentity::resolve(soft.to_str().unwrap()).unwrap(), id);

        let other = temp_dir.path().join("other.txt");
        fs::write(&other, "hello\n").unwrap();
        assert_ne!(FileIdentity::resolve(other.to_str().unwrap()).unwrap(), id);
    }
}
