//! Row streaming independent of the wire and of where the rows live.
//!
//! A [`DataSource`] produces rows lazily and a [`DataSink`] consumes them. The
//! connection uses them for both directions of a data block: rows read from a
//! caller's source are written to a sink the transport hands out, and rows the
//! peer sends are read from a transport source into the caller's sink. The same
//! traits back in-memory buffers, files and arbitrary byte streams.
//!
//! # Key Components
//!
//! - [`ArraySource`] / [`ArraySink`]: in-memory rows.
//! - [`FileSource`] / [`FileSink`]: rows stored one per line in a file.
//! - [`PipeSource`] / [`PipeSink`]: rows read from / written to any stream.
//! - [`LimitedSource`]: stops after a fixed number of rows.
//! - [`NullSource`] / [`NullSink`]: the empty source and the discarding sink.
//!
//! # Example
//! ```rust
//! use gpclient::data::{ArraySink, ArraySource, copy};
//! use gpclient::Row;
//!
//! let mut source = ArraySource::new(vec![Row::from((1, 2)), Row::from((1, 3))]);
//! let mut sink = ArraySink::new();
//!
//! let mut only_first = |row: Row| if row.get(1)?.as_int()? == 2 { Some(row) } else { None };
//! copy(&mut source, &mut sink, Some(&mut only_first)).unwrap();
//!
//! assert_eq!(sink.rows(), &[Row::from((1, 2))]);
//! ```
mod sink;
mod source;

use log::trace;

use crate::{ClientResult, Row};

pub use sink::{ArraySink, FileSink, NULL_SINK, NullSink, PipeSink};
pub use source::{ArraySource, FileSource, LimitedSource, NULL_SOURCE, NullSource, PipeSource};

/// Per-row transform applied while copying. Returning `None` drops the row.
pub type RowMunger<'a> = &'a mut dyn FnMut(Row) -> Option<Row>;

/// Lazy, finite producer of rows.
pub trait DataSource {
    /// Returns the next row, or `None` once the source is exhausted.
    fn next_row(&mut self) -> ClientResult<Option<Row>>;

    fn close(&mut self) -> ClientResult<()> {
        Ok(())
    }

    /// Reads every remaining row into memory and closes the source.
    ///
    /// Only meant for small result sets.
    fn drain(&mut self) -> ClientResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        self.close()?;
        Ok(rows)
    }
}

/// Consumer of rows.
pub trait DataSink {
    fn put_row(&mut self, row: Row) -> ClientResult<()>;

    /// Commits any buffered rows.
    fn flush(&mut self) -> ClientResult<()> {
        Ok(())
    }

    fn close(&mut self) -> ClientResult<()> {
        self.flush()
    }
}

/// Streams every row of `source` into `sink`, then flushes the sink.
///
/// Returns the number of rows handed to the sink.
pub fn copy(
    source: &mut dyn DataSource,
    sink: &mut dyn DataSink,
    mut munger: Option<RowMunger<'_>>,
) -> ClientResult<usize> {
    let mut count = 0;
    while let Some(row) = source.next_row()? {
        let row = match munger.as_deref_mut() {
            Some(munge) => match munge(row) {
                Some(row) => row,
                None => continue,
            },
            None => row,
        };

        trace!("row {row}");
        sink.put_row(row)?;
        count += 1;
    }
    sink.flush()?;
    Ok(count)
}
