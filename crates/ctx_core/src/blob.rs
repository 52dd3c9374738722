//! Content-addressed blob storage with integrity verification.

use crate::error::{CtxError, Result};
use crate::hash::ContentHash;
use std::fs;
use std::path::{Path, PathBuf};

/// Content-addressed blob store rooted at a `.ctx` directory.
///
/// Blobs are immutable files stored under `objects/<aa>/<remaining-62>`,
/// written atomically (temp file + rename) with read-only permissions.
/// Reads re-hash the content and fail on mismatch.
///
/// # Examples
///
/// ```
/// use ctx_core::BlobStore;
/// use tempfile::TempDir;
///
/// let tmp = TempDir::new().unwrap();
/// let blobs = BlobStore::new(tmp.path());
///
/// let hash = blobs.write(b"hello world").unwrap();
/// assert_eq!(blobs.read(hash).unwrap(), b"hello world");
/// ```
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Creates a blob store handle for the given store root (the `.ctx` dir).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Computes the filesystem path for a blob.
    fn blob_path(&self, hash: ContentHash) -> PathBuf {
        let hex = hash.hex();
        self.root.join("objects").join(&hex[..2]).join(&hex[2..])
    }

    /// Stores bytes and returns their content hash.
    ///
    /// If a blob with the same hash already exists the write is skipped and
    /// the existing hash returned (deduplication). Existing blobs are never
    /// overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation, the temp-file write, or the
    /// final rename fails.
    pub fn write(&self, data: &[u8]) -> Result<ContentHash> {
        let hash = ContentHash::of(data);
        let path = self.blob_path(hash);

        // Deduplication: skip if already present.
        if path.exists() {
            return Ok(hash);
        }

        let dir = path.parent().expect("blob path has a parent");
        fs::create_dir_all(dir)?;

        // Atomic write: temp sibling, then rename into place.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data)?;
        set_read_only(&tmp)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        Ok(hash)
    }

    /// Reads a blob and verifies its integrity.
    ///
    /// # Errors
    ///
    /// Returns `BlobNotFound` if the blob is missing and `BlobIntegrity` if
    /// re-hashing the content does not reproduce the requested hash; the
    /// caller must not consume the bytes in that case.
    pub fn read(&self, hash: ContentHash) -> Result<Vec<u8>> {
        let path = self.blob_path(hash);

        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CtxError::BlobNotFound(hash.short(12)));
            }
            Err(e) => return Err(e.into()),
        };

        let actual = ContentHash::of(&data);
        if actual != hash {
            return Err(CtxError::BlobIntegrity {
                expected: hash.short(12),
                actual: actual.short(12),
            });
        }

        Ok(data)
    }

    /// Checks whether a blob exists without reading it.
    ///
    /// Non-authoritative: does not verify integrity.
    pub fn exists(&self, hash: ContentHash) -> bool {
        self.blob_path(hash).exists()
    }
}

/// Marks a file read-only (mode 0444 on Unix) so accidental corruption
/// of stored blobs is visible.
fn set_read_only(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o444))?;
    }
    #[cfg(not(unix))]
    {
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_readonly(true);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_read_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let blobs = BlobStore::new(tmp.path());

        let hash = blobs.write(b"roundtrip").unwrap();
        assert_eq!(blobs.read(hash).unwrap(), b"roundtrip");
    }

    #[test]
    fn test_deduplication_single_file() {
        let tmp = TempDir::new().unwrap();
        let blobs = BlobStore::new(tmp.path());

        let h1 = blobs.write(b"dedupe").unwrap();
        let h2 = blobs.write(b"dedupe").unwrap();
        assert_eq!(h1, h2);

        // Exactly one file under the shard directory.
        let shard = tmp.path().join("objects").join(&h1.hex()[..2]);
        assert_eq!(fs::read_dir(shard).unwrap().count(), 1);
    }

    #[test]
    fn test_shard_layout() {
        let tmp = TempDir::new().unwrap();
        let blobs = BlobStore::new(tmp.path());

        let hash = blobs.write(b"layout").unwrap();
        let hex = hash.hex();
        let expected = tmp.path().join("objects").join(&hex[..2]).join(&hex[2..]);
        assert!(expected.is_file());
    }

    #[test]
    fn test_read_missing() {
        let tmp = TempDir::new().unwrap();
        let blobs = BlobStore::new(tmp.path());

        let missing = ContentHash::of(b"never written");
        assert!(matches!(
            blobs.read(missing),
            Err(CtxError::BlobNotFound(_))
        ));
    }

    #[test]
    fn test_integrity_failure() {
        let tmp = TempDir::new().unwrap();
        let blobs = BlobStore::new(tmp.path());

        let hash = blobs.write(b"original").unwrap();
        let path = blobs.blob_path(hash);

        // Corrupt the blob behind the store's back.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        }
        fs::write(&path, b"corrupted").unwrap();

        assert!(matches!(
            blobs.read(hash),
            Err(CtxError::BlobIntegrity { .. })
        ));
    }

    #[test]
    fn test_exists() {
        let tmp = TempDir::new().unwrap();
        let blobs = BlobStore::new(tmp.path());

        assert!(!blobs.exists(ContentHash::of(b"nope")));
        let hash = blobs.write(b"yes").unwrap();
        assert!(blobs.exists(hash));
    }

    #[test]
    fn test_empty_blob() {
        let tmp = TempDir::new().unwrap();
        let blobs = BlobStore::new(tmp.path());

        let hash = blobs.write(b"").unwrap();
        assert!(blobs.read(hash).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_blob_is_read_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let blobs = BlobStore::new(tmp.path());

        let hash = blobs.write(b"ro").unwrap();
        let mode = fs::metadata(blobs.blob_path(hash)).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o444);
    }

    #[test]
    fn test_no_leftover_temp_files() {
        let tmp = TempDir::new().unwrap();
        let blobs = BlobStore::new(tmp.path());

        let hash = blobs.write(b"clean").unwrap();
        let shard = tmp.path().join("objects").join(&hash.hex()[..2]);
        for entry in fs::read_dir(shard).unwrap() {
            let path = entry.unwrap().path();
            assert_ne!(path.extension().and_then(|s| s.to_str()), Some("tmp"));
        }
    }
}
