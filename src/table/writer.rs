use std::{
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
};

use csv::WriterBuilder;

use crate::error::{EnrichError, Result};

/// Streams CSV records to a destination, header first.
pub struct TableWriter<W: Write> {
    inner: csv::Writer<W>,
    path: PathBuf,
}

impl TableWriter<File> {
    /// Create (or truncate) the file at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let inner = WriterBuilder::new()
            .from_path(path)
            .map_err(|source| write_error(path, source))?;
        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }
}

impl<W: Write> TableWriter<W> {
    /// Wrap any writer; `path` labels errors.
    pub fn from_writer(dest: W, path: impl Into<PathBuf>) -> Self {
        Self {
            inner: WriterBuilder::new().from_writer(dest),
            path: path.into(),
        }
    }

    pub fn write_header(&mut self, header: &[String]) -> Result<()> {
        self.inner
            .write_record(header)
            .map_err(|source| write_error(&self.path, source))
    }

    pub fn write_row(&mut self, row: &[String]) -> Result<()> {
        self.inner
            .write_record(row)
            .map_err(|source| write_error(&self.path, source))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner
            .flush()
            .map_err(|source| write_error(&self.path, csv::Error::from(source)))
    }

    /// Flush and hand back the destination.
    pub fn finish(mut self) -> Result<W> {
        self.flush()?;
        let path = self.path;
        self.inner.into_inner().map_err(|e| {
            let err = io::Error::new(e.error().kind(), e.error().to_string());
            write_error(&path, csv::Error::from(err))
        })
    }
}

fn write_error(path: &Path, source: csv::Error) -> EnrichError {
    EnrichError::Write {
        path: path.to_path_buf(),
        source,
    }
}
