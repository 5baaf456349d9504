use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// A flat namespace of immutable byte files.
///
/// Files are written whole and never modified; a name is reused only after a
/// delete.
pub trait Directory: Send + Sync + Debug {
    /// All file names, sorted
    fn list_all(&self) -> io::Result<Vec<String>>;

    fn file_exists(&self, name: &str) -> bool;

    fn file_length(&self, name: &str) -> io::Result<u64>;

    fn write_file(&self, name: &str, data: &[u8]) -> io::Result<()>;

    fn read_file(&self, name: &str) -> io::Result<Vec<u8>>;

    fn delete_file(&self, name: &str) -> io::Result<()>;
}

fn not_found(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("file not found: {}", name))
}

/// In-memory directory
#[derive(Debug, Default)]
pub struct RamDirectory {
    files: RwLock<BTreeMap<String, Arc<Vec<u8>>>>,
}

impl RamDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes held
    pub fn size_in_bytes(&self) -> u64 {
        self.files.read().values().map(|f| f.len() as u64).sum()
    }
}

impl Directory for RamDirectory {
    fn list_all(&self) -> io::Result<Vec<String>> {
        Ok(self.files.read().keys().cloned().collect())
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.read().contains_key(name)
    }

    fn file_length(&self, name: &str) -> io::Result<u64> {
        self.files
            .read()
            .get(name)
            .map(|f| f.len() as u64)
            .ok_or_else(|| not_found(name))
    }

    fn write_file(&self, name: &str, data: &[u8]) -> io::Result<()> {
        self.files
            .write()
            .insert(name.to_string(), Arc::new(data.to_vec()));
        Ok(())
    }

    fn read_file(&self, name: &str) -> io::Result<Vec<u8>> {
        self.files
            .read()
            .get(name)
            .map(|f| f.as_ref().clone())
            .ok_or_else(|| not_found(name))
    }

    fn delete_file(&self, name: &str) -> io::Result<()> {
        self.files
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }
}

/// Directory backed by plain files under `base_dir`
#[derive(Debug)]
pub struct FsDirectory {
    base_dir: PathBuf,
}

impl FsDirectory {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> io::Result<Self> {
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.base_dir
    }
}

impl Directory for FsDirectory {
    fn list_all(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn file_exists(&self, name: &str) -> bool {
        self.base_dir.join(name).is_file()
    }

    fn file_length(&self, name: &str) -> io::Result<u64> {
        Ok(fs::metadata(self.base_dir.join(name))?.len())
    }

    fn write_file(&self, name: &str, data: &[u8]) -> io::Result<()> {
        let path = self.base_dir.join(name);
        let tmp = self.base_dir.join(format!("{}.tmp", name));
        fs::write(&tmp, data)?;
        fs::rename(tmp, path)
    }

    fn read_file(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.base_dir.join(name))
    }

    fn delete_file(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.base_dir.join(name))
    }
}

/// Records the name of every file written, or attempted, through it
#[derive(Debug)]
pub struct TrackingDirectory {
    inner: Arc<dyn Directory>,
    created: Mutex<BTreeSet<String>>,
}

impl TrackingDirectory {
    pub fn new(inner: Arc<dyn Directory>) -> Self {
        Self {
            inner,
            created: Mutex::new(BTreeSet::new()),
        }
    }

    /// Names written so far and not deleted since, sorted
    pub fn created_files(&self) -> Vec<String> {
        self.created.lock().iter().cloned().collect()
    }
}

impl Directory for TrackingDirectory {
    fn list_all(&self) -> io::Result<Vec<String>> {
        self.inner.list_all()
    }

    fn file_exists(&self, name: &str) -> bool {
        self.inner.file_exists(name)
    }

    fn file_length(&self, name: &str) -> io::Result<u64> {
        self.inner.file_length(name)
    }

    fn write_file(&self, name: &str, data: &[u8]) -> io::Result<()> {
        // Recorded first: a failed write may still leave a partial file
        self.created.lock().insert(name.to_string());
        self.inner.write_file(name, data)
    }

    fn read_file(&self, name: &str) -> io::Result<Vec<u8>> {
        self.inner.read_file(name)
    }

    fn delete_file(&self, name: &str) -> io::Result<()> {
        self.inner.delete_file(name)?;
        self.created.lock().remove(name);
        Ok(())
    }
}
