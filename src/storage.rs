//! Read/write collaborator for whole documents.
//!
//! The patch pipeline only ever hands storage one complete final byte
//! sequence per destination. [`FsStorage`] makes that write atomic on disk;
//! [`MemoryStorage`] keeps everything in memory for previews and tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub trait Storage {
    fn read(&self, path: &Path) -> io::Result<String>;
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;
}

/// Filesystem storage with tempfile + fsync + rename writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStorage;

impl Storage for FsStorage {
    fn read(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        atomic_write(path, contents.as_bytes())
    }
}

/// Atomic file write: tempfile in the same directory, fsync, rename.
///
/// Either the full write lands or the original file is left as it was.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    // Same directory keeps the rename on one filesystem
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "path has no parent directory",
            ))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

/// In-memory storage that counts writes.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RefCell<HashMap<PathBuf, String>>,
    writes: Cell<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.files.borrow_mut().insert(path.into(), contents.into());
        self
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files.borrow().get(path.as_ref()).cloned()
    }

    /// Number of successful `write` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.get()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, path: &Path) -> io::Result<String> {
        self.files.borrow().get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such document: {}", path.display()),
            )
        })
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.files
            .borrow_mut()
            .insert(path.to_path_buf(), contents.to_string());
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

/// Read-through layer that captures writes in memory, leaving `base` untouched.
///
/// Sequential patches against one file see each other's results, which is
/// what a dry run needs.
#[derive(Debug)]
pub struct Overlay<'a, S: Storage + ?Sized> {
    base: &'a S,
    writes: MemoryStorage,
}

impl<'a, S: Storage + ?Sized> Overlay<'a, S> {
    pub fn new(base: &'a S) -> Self {
        Self {
            base,
            writes: MemoryStorage::new(),
        }
    }

    /// Contents a write would have produced, if any.
    pub fn pending(&self, path: impl AsRef<Path>) -> Option<String> {
        self.writes.get(path)
    }
}

impl<S: Storage + ?Sized> Storage for Overlay<'_, S> {
    fn read(&self, path: &Path) -> io::Result<String> {
        match self.writes.get(path) {
            Some(contents) => Ok(contents),
            None => self.base.read(path),
        }
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.writes.write(path, contents)
    }
}
