//! Shared helpers for integration tests

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use parking_lot::Mutex;
use quire::store::{Directory, RamDirectory};

static INIT: Once = Once::new();

/// Route `tracing` output to the test harness; honours `RUST_LOG`
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Directory that fails writes of names containing a marker, and counts
/// length lookups
#[derive(Debug, Default)]
pub struct FaultyDirectory {
    inner: RamDirectory,
    fail_writes_containing: Mutex<Option<String>>,
    fail_lengths: Mutex<bool>,
    pub length_calls: AtomicUsize,
}

impl FaultyDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_writes_containing(&self, marker: Option<&str>) {
        *self.fail_writes_containing.lock() = marker.map(str::to_string);
    }

    pub fn fail_lengths(&self, fail: bool) {
        *self.fail_lengths.lock() = fail;
    }

    pub fn length_calls(&self) -> usize {
        self.length_calls.load(Ordering::SeqCst)
    }
}

impl Directory for FaultyDirectory {
    fn list_all(&self) -> io::Result<Vec<String>> {
        self.inner.list_all()
    }

    fn file_exists(&self, name: &str) -> bool {
        self.inner.file_exists(name)
    }

    fn file_length(&self, name: &str) -> io::Result<u64> {
        self.length_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_lengths.lock() {
            return Err(io::Error::new(io::ErrorKind::Other, "length lookup failed"));
        }
        self.inner.file_length(name)
    }

    fn write_file(&self, name: &str, data: &[u8]) -> io::Result<()> {
        if let Some(marker) = self.fail_writes_containing.lock().as_deref() {
            if name.contains(marker) {
                // Leave a partial file behind, as a crashed write would
                self.inner.write_file(name, &data[..data.len() / 2])?;
                return Err(io::Error::new(io::ErrorKind::Other, format!("write of {} failed", name)));
            }
        }
        self.inner.write_file(name, data)
    }

    fn read_file(&self, name: &str) -> io::Result<Vec<u8>> {
        self.inner.read_file(name)
    }

    fn delete_file(&self, name: &str) -> io::Result<()> {
        self.inner.delete_file(name)
    }
}
