use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::{CertificateStore, StoreError, check_name};

/// Stores each entry as a file named after it inside `root`.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        check_name(name)?;
        Ok(self.root.join(name))
    }
}

impl CertificateStore for DirectoryStore {
    fn exists(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.entry_path(name)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.entry_path(name)?;
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(name.to_string()),
            _ => StoreError::io(path, e),
        })
    }

    #[instrument(skip(self, data), fields(root = %self.root.display()))]
    fn put(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = self.entry_path(name)?;
        fs::create_dir_all(&self.root).map_err(|e| StoreError::io(&self.root, e))?;
        write_file_atomic(&path, data, 0o600)?;
        debug!(path = %path.display(), "Stored secret");
        Ok(())
    }
}

fn write_file_atomic(path: &Path, content: &[u8], mode: u32) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    // Write next to the target, then rename over it
    let mut temp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    temp.write_all(content)
        .map_err(|e| StoreError::io(temp.path(), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(mode))
            .map_err(|e| StoreError::io(temp.path(), e))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    temp.persist(path)
        .map(|_| ())
        .map_err(|e| StoreError::io(path, e.error))
}
