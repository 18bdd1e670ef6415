use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::{ClientError, ClientResult, Field, Row, protocol::LINEBREAK, row::pairs_to_map};

use super::{ArraySource, DataSink};

/// Sink that discards every row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullSink;

/// The shared discarding sink.
pub const NULL_SINK: NullSink = NullSink;

impl DataSink for NullSink {
    fn put_row(&mut self, _row: Row) -> ClientResult<()> {
        Ok(())
    }
}

/// Collects rows in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArraySink {
    rows: Vec<Row>,
}

impl ArraySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Interprets the collected rows as key/value pairs.
    pub fn to_map(&self) -> ClientResult<HashMap<Field, Field>> {
        pairs_to_map(&self.rows, 0, 1)
    }

    pub fn into_source(self) -> ArraySource {
        ArraySource::new(self.rows)
    }
}

impl From<Vec<Row>> for ArraySink {
    fn from(rows: Vec<Row>) -> Self {
        Self { rows }
    }
}

impl DataSink for ArraySink {
    fn put_row(&mut self, row: Row) -> ClientResult<()> {
        self.rows.push(row);
        Ok(())
    }
}

/// Writes encoded rows to a stream, one per line.
#[derive(Debug)]
pub struct PipeSink<W> {
    hout: W,
    linebreak: &'static str,
}

impl<W: Write> PipeSink<W> {
    pub fn new(hout: W) -> Self {
        Self::with_linebreak(hout, LINEBREAK)
    }

    pub fn with_linebreak(hout: W, linebreak: &'static str) -> Self {
        Self { hout, linebreak }
    }

    pub fn into_inner(self) -> W {
        self.hout
    }
}

impl<W: Write> DataSink for PipeSink<W> {
    fn put_row(&mut self, row: Row) -> ClientResult<()> {
        let line = format!("{}{}", row.to_line()?, self.linebreak);
        self.hout
            .write_all(line.as_bytes())
            .map_err(|e| ClientError::io("failed to write data row, broken pipe", e))
    }

    fn flush(&mut self) -> ClientResult<()> {
        self.hout
            .flush()
            .map_err(|e| ClientError::io("failed to flush data rows", e))
    }
}

/// Rows written one per line to a file.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    inner: Option<PipeSink<BufWriter<File>>>,
}

impl FileSink {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> ClientResult<Self> {
        Self::open(path, false, "\n")
    }

    /// Opens `path` for writing, appending to existing content when `append`
    /// is set.
    pub fn open(
        path: impl AsRef<Path>,
        append: bool,
        linebreak: &'static str,
    ) -> ClientResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)
            .map_err(|e| ClientError::io(format!("failed to open {}", path.display()), e))?;

        Ok(Self {
            path,
            inner: Some(PipeSink::with_linebreak(BufWriter::new(file), linebreak)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataSink for FileSink {
    fn put_row(&mut self, row: Row) -> ClientResult<()> {
        match self.inner.as_mut() {
            Some(inner) => inner.put_row(row),
            None => Err(ClientError::usage(format!(
                "file sink {} already closed",
                self.path.display()
            ))),
        }
    }

    fn flush(&mut self) -> ClientResult<()> {
        match self.inner.as_mut() {
            Some(inner) => inner.flush(),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> ClientResult<()> {
        self.flush()?;
        self.inner = None;
        Ok(())
    }
}
