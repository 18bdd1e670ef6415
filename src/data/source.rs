use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use crate::{ClientError, ClientResult, Row};

use super::{ArraySink, DataSource};

/// Source that never yields a row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullSource;

/// The shared empty source.
pub const NULL_SOURCE: NullSource = NullSource;

impl DataSource for NullSource {
    fn next_row(&mut self) -> ClientResult<Option<Row>> {
        Ok(None)
    }
}

/// Rows held in memory. Can be rewound and read again.
#[derive(Debug, Clone, Default)]
pub struct ArraySource {
    rows: Vec<Row>,
    index: usize,
}

impl ArraySource {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows, index: 0 }
    }

    pub fn rewind(&mut self) {
        self.index = 0;
    }

    pub fn into_sink(self) -> ArraySink {
        ArraySink::from(self.rows)
    }
}

impl<R: Into<Row>> FromIterator<R> for ArraySource {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

impl DataSource for ArraySource {
    fn next_row(&mut self) -> ClientResult<Option<Row>> {
        let row = self.rows.get(self.index).cloned();
        if row.is_some() {
            self.index += 1;
        }
        Ok(row)
    }
}

/// Stops after `limit` rows of the wrapped source.
#[derive(Debug)]
pub struct LimitedSource<S> {
    source: S,
    limit: usize,
    index: usize,
}

impl<S: DataSource> LimitedSource<S> {
    pub fn new(source: S, limit: usize) -> Self {
        Self {
            source,
            limit,
            index: 0,
        }
    }

    /// Whether the limit, rather than exhaustion of the wrapped source, ended
    /// the stream.
    pub fn limit_reached(&self) -> bool {
        self.index >= self.limit
    }

    pub fn into_inner(self) -> S {
        self.source
    }
}

impl<S: DataSource> DataSource for LimitedSource<S> {
    fn next_row(&mut self) -> ClientResult<Option<Row>> {
        if self.limit_reached() {
            return Ok(None);
        }

        let row = self.source.next_row()?;
        if row.is_some() {
            self.index += 1;
        }
        Ok(row)
    }

    fn close(&mut self) -> ClientResult<()> {
        self.source.close()
    }
}

/// Rows read line by line from a stream, up to the first blank line or the
/// end of the stream.
#[derive(Debug)]
pub struct PipeSource<R> {
    hin: R,
    done: bool,
}

impl<R: BufRead> PipeSource<R> {
    pub fn new(hin: R) -> Self {
        Self { hin, done: false }
    }

    pub fn into_inner(self) -> R {
        self.hin
    }
}

impl<R: BufRead> DataSource for PipeSource<R> {
    fn next_row(&mut self) -> ClientResult<Option<Row>> {
        if self.done {
            return Ok(None);
        }

        let mut line = String::new();
        self.hin
            .read_line(&mut line)
            .map_err(|e| ClientError::io("failed to read data row", e))?;

        let row = Row::decode(line.trim());
        self.done = row.is_none();
        Ok(row)
    }
}

/// Rows stored one per line in a file.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    inner: Option<PipeSource<BufReader<File>>>,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|e| ClientError::io(format!("failed to open {}", path.display()), e))?;

        Ok(Self {
            path,
            inner: Some(PipeSource::new(BufReader::new(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataSource for FileSource {
    fn next_row(&mut self) -> ClientResult<Option<Row>> {
        match self.inner.as_mut() {
            Some(inner) => inner.next_row(),
            None => Ok(None),
        }
    }

    fn close(&mut self) -> ClientResult<()> {
        self.inner = None;
        Ok(())
    }
}
