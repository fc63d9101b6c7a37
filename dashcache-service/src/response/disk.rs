//! On-disk value files: `{dir}/{blake3(key)}.json`, written atomically.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub(crate) struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    /// Open `dir`, creating it if needed and deleting any value files left
    /// by a previous process.
    pub(crate) fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let store = Self { dir };
        store.purge()?;
        Ok(store)
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let hash = blake3::hash(key.as_bytes());
        self.dir.join(format!("{}.json", hash.to_hex()))
    }

    pub(crate) fn read(&self, key: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path_for(key))
    }

    /// Write to a temporary sibling, then rename over the target.
    pub(crate) fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }

    pub(crate) fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Delete every value and temporary file in the directory.
    pub(crate) fn purge(&self) -> io::Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
            if path.is_file() && (name.ends_with(".json") || name.ends_with(".json.tmp")) {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
