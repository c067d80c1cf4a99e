use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::HarnessError;

/// Append-only accumulator for raw oracle output. Chunks are kept in the
/// order they were appended.
pub trait RawSink {
    fn append(&mut self, chunk: &str) -> Result<(), HarnessError>;
    fn contents(&self) -> Result<String, HarnessError>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemorySink {
    buf: String,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self { buf: String::new() }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.buf
    }
}

impl RawSink for MemorySink {
    fn append(&mut self, chunk: &str) -> Result<(), HarnessError> {
        self.buf.push_str(chunk);
        Ok(())
    }

    fn contents(&self) -> Result<String, HarnessError> {
        Ok(self.buf.clone())
    }
}

/// File-backed sink opened in append mode.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: fs::File,
}

impl FileSink {
    /// Removes any output left by an earlier run, then opens `path` for
    /// appending. A missing file is not an error.
    pub fn create_fresh(path: &Path) -> Result<Self, HarnessError> {
        remove_if_present(path)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Closes and deletes the backing file.
    pub fn discard(self) -> Result<(), HarnessError> {
        let Self { path, file } = self;
        drop(file);
        remove_if_present(&path)
    }
}

impl RawSink for FileSink {
    fn append(&mut self, chunk: &str) -> Result<(), HarnessError> {
        self.file.write_all(chunk.as_bytes())?;
        Ok(())
    }

    fn contents(&self) -> Result<String, HarnessError> {
        Ok(fs::read_to_string(&self.path)?)
    }
}

pub(crate) fn remove_if_present(path: &Path) -> Result<(), HarnessError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
