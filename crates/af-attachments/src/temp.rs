//! Temp file staging
//!
//! Uploaded bytes live in uniquely named files under one process-wide
//! directory until the pipeline commits them. Files written here are
//! removed once the last `StagedFile` handle pointing at them is dropped.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tempfile::TempPath;
use tokio::fs;
use tracing::debug;

use crate::sanitize::split_extension;

/// A file holding staged attachment data
#[derive(Debug, Clone)]
pub enum StagedFile {
    /// Owned by the temp store, shared between a parent and its thumbnails
    Temp(Arc<TempPath>),
    /// Already on disk and owned by the caller (e.g. a multipart spool file)
    External(PathBuf),
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        match self {
            StagedFile::Temp(p) => p,
            StagedFile::External(p) => p,
        }
    }
}

/// Manages the temp directory used during a processing cycle
#[derive(Debug, Clone)]
pub struct TempFileStore {
    dir: PathBuf,
}

impl TempFileStore {
    /// Create the store, creating `dir` if needed
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve a new uniquely named, empty temp file
    fn reserve(&self, filename: Option<&str>) -> io::Result<TempPath> {
        let (base, ext) = match filename {
            Some(name) => split_extension(name),
            None => ("attachment", ""),
        };
        let prefix = format!("{}{}", Utc::now().timestamp(), base);

        let file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(ext)
            .rand_bytes(8)
            .tempfile_in(&self.dir)?;
        Ok(file.into_temp_path())
    }

    /// Write `data` to a new temp file
    pub async fn write(&self, data: &Bytes, filename: Option<&str>) -> io::Result<StagedFile> {
        let path = self.reserve(filename)?;
        fs::write(&path, data).await?;
        debug!(path = %path.display(), size = data.len(), "Staged upload data");
        Ok(StagedFile::Temp(Arc::new(path)))
    }

}

/// Read the bytes of a staged file
pub async fn read_staged(file: &Path) -> io::Result<Bytes> {
    Ok(Bytes::from(fs::read(file).await?))
}

/// Size in bytes of a staged file
pub async fn staged_len(file: &Path) -> io::Result<u64> {
    Ok(fs::metadata(file).await?.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempFileStore::new(dir.path().join("staging")).unwrap();

        let staged = store
            .write(&Bytes::from("hello"), Some("greeting.txt"))
            .await
            .unwrap();
        let path = staged.path().to_path_buf();

        assert!(path.starts_with(store.dir()));
        assert!(path.to_string_lossy().ends_with(".txt"));
        assert!(path.file_name().unwrap().to_string_lossy().contains("greeting"));
        assert_eq!(read_staged(&path).await.unwrap(), Bytes::from("hello"));
        assert_eq!(staged_len(&path).await.unwrap(), 5);

        let shared = staged.clone();
        drop(staged);
        assert!(path.exists());
        drop(shared);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempFileStore::new(dir.path()).unwrap();

        let a = store.write(&Bytes::from("a"), Some("same.png")).await.unwrap();
        let b = store.write(&Bytes::from("b"), Some("same.png")).await.unwrap();
        assert_ne!(a.path(), b.path());
    }


    #[test]
    fn test_directory_creation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        TempFileStore::new(&nested).unwrap();
        TempFileStore::new(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
