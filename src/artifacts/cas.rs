use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const DIGEST_PREFIX: &str = "sha256:";

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Content-addressed blob directory: `<root>/sha256/<h[0..2]>/<h[2..4]>/<h>`.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn path_for_hex(&self, hex: &str) -> PathBuf {
        self.root
            .join("sha256")
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(hex)
    }

    /// Path of the blob behind a `sha256:<hex>` digest.
    pub fn path_for(&self, digest: &str) -> io::Result<PathBuf> {
        Ok(self.path_for_hex(digest_hex(digest)?))
    }

    /// Stores `bytes` once and returns their digest.
    pub fn put(&self, bytes: &[u8]) -> io::Result<String> {
        let hex = sha256_hex(bytes);
        let path = self.path_for_hex(&hex);
        if !path.exists() {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            // a blob only appears under its digest once fully written
            let tmp = path.with_extension("partial");
            fs::write(&tmp, bytes)?;
            fs::rename(&tmp, &path)?;
        }
        Ok(format!("{}{}", DIGEST_PREFIX, hex))
    }

    /// Reads a blob and checks it still hashes to its digest.
    pub fn get(&self, digest: &str) -> io::Result<Vec<u8>> {
        let hex = digest_hex(digest)?;
        let bytes = fs::read(self.path_for_hex(hex))?;
        if sha256_hex(&bytes) != hex {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("blob {} is corrupt", digest),
            ));
        }
        Ok(bytes)
    }

    /// Verified copy of a blob to `dest`. Returns the number of bytes written.
    pub fn copy_to(&self, digest: &str, dest: &Path) -> io::Result<u64> {
        let bytes = self.get(digest)?;
        if let Some(dir) = dest.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(dest, &bytes)?;
        Ok(bytes.len() as u64)
    }
}

fn digest_hex(digest: &str) -> io::Result<&str> {
    digest
        .strip_prefix(DIGEST_PREFIX)
        .filter(|hex| hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("bad digest '{}'", digest),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_is_content_addressed_and_idempotent() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let a = store.put(b"price,longitude\n").unwrap();
        let b = store.put(b"price,longitude\n").unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("sha256:"));
        let path = store.path_for(&a).unwrap();
        assert!(path.starts_with(dir.path().join("sha256")));
        assert_eq!(fs::read(path).unwrap(), b"price,longitude\n");
    }

    #[test]
    fn get_detects_corruption() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let digest = store.put(b"original").unwrap();
        fs::write(store.path_for(&digest).unwrap(), b"tampered").unwrap();
        let err = store.get(&digest).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn copy_to_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path().join("objects"));
        let digest = store.put(b"abc").unwrap();
        let dest = dir.path().join("downloads").join("x-v0").join("x.csv");
        assert_eq!(store.copy_to(&digest, &dest).unwrap(), 3);
        assert_eq!(fs::read(dest).unwrap(), b"abc");
    }

    #[test]
    fn rejects_malformed_digest() {
        let store = BlobStore::new("unused");
        assert!(store.path_for("cas:sha256:abc").is_err());
        assert!(store.path_for("sha256:xyz").is_err());
    }
}
