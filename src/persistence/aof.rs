//! Append-Only Log
//!
//! Every mutating command is appended as one text line holding the same
//! space-separated tokens a client would send:
//!
//! ```text
//! SET user:1 Ariz
//! EXPIRE user:1 60
//! INCR visits
//! DEL user:1
//! FLUSHALL
//! ```
//!
//! The file handle is opened lazily on first append and then kept open in
//! append mode. Appends are serialized through a `std::sync::Mutex`; the
//! command layer additionally appends while holding the store's section, so
//! line order is mutation order.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Split, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// A durability log backed by a single append-only text file.
#[derive(Debug)]
pub struct AppendOnlyLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl AppendOnlyLog {
    /// Creates a log at `path`. Nothing touches the filesystem until the
    /// first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }

    /// Appends one record, terminated by a single newline.
    ///
    /// If the write fails the handle is dropped, so the next append reopens
    /// the file instead of writing through a broken descriptor.
    pub fn append(&self, record: &str) -> io::Result<()> {
        let mut slot = self.file.lock().unwrap_or_else(PoisonError::into_inner);

        let mut file = match slot.take() {
            Some(file) => file,
            None => self.open()?,
        };

        let mut line = String::with_capacity(record.len() + 1);
        line.push_str(record.trim_end_matches(['\r', '\n']));
        line.push('\n');

        file.write_all(line.as_bytes())?;
        *slot = Some(file);
        Ok(())
    }

    /// Flushes appended records to stable storage.
    pub fn sync(&self) -> io::Result<()> {
        let slot = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(file) => file.sync_all(),
            None => Ok(()),
        }
    }

    /// Returns the stored records in file order.
    ///
    /// A log that was never written yields nothing.
    pub fn replay_lines(&self) -> io::Result<ReplayLines> {
        match File::open(&self.path) {
            Ok(file) => Ok(ReplayLines {
                inner: Some(BufReader::new(file).split(b'\n')),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ReplayLines { inner: None }),
            Err(e) => Err(e),
        }
    }
}

/// Iterator over the trimmed, non-empty records of a log file.
///
/// Invalid UTF-8 is replaced rather than rejected.
#[derive(Debug)]
pub struct ReplayLines {
    inner: Option<Split<BufReader<File>>>,
}

impl Iterator for ReplayLines {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.inner.as_mut()?;
        loop {
            let raw = match lines.next()? {
                Ok(raw) => raw,
                Err(e) => return Some(Err(e)),
            };
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if !line.is_empty() {
                return Some(Ok(line.to_string()));
            }
        }
    }
}
