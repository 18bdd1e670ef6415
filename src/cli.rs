//! Interactive shell utilities.
//!
//! Used by the `gp-shell` binary to read commands from a terminal and run them
//! on a connection.
use std::{
    io::{BufRead, Write},
    sync::atomic::{AtomicBool, Ordering},
};

use log::debug;

use crate::{
    ClientError, ClientResult, Command, Connection, ErrorKind,
    data::{DataSink, DataSource, PipeSink, PipeSource},
    transport::Transport,
};

/// What the user typed at the prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// `.exit` or `.quit`
    Exit,
    /// A command line for the graph processor.
    Command(String),
    /// Blank line.
    Empty,
    /// End of input.
    Eof,
}

/// Prompts for one line of input.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> ClientResult<Input>
where
    R: BufRead,
    W: Write,
{
    write!(&mut writer, "> ")
        .and_then(|_| writer.flush())
        .map_err(|e| ClientError::io("failed to write prompt", e))?;

    let mut s = String::default();
    let read = reader
        .read_line(&mut s)
        .map_err(|e| ClientError::io("failed to read input", e))?;
    if read == 0 {
        return Ok(Input::Eof);
    }

    match s.trim() {
        ".exit" | ".quit" => Ok(Input::Exit),
        "" => Ok(Input::Empty),
        s if !s.starts_with('.') => Ok(Input::Command(s.to_string())),
        s => Err(ClientError::usage(format!("unrecognized command '{s}'"))),
    }
}

/// Reads command lines from `input` and runs them on `conn` until `.exit`, end
/// of input, or `interrupted` is set. Rows go to `out`, prompts and status
/// lines to `err`.
///
/// A line ending in `:` is followed by a data block read from `input`. Usage
/// and processor errors are reported and the loop goes on; any other error
/// ends it. The connection is closed on return.
pub fn shell<T, R, O, E>(
    conn: &mut Connection<T>,
    mut input: R,
    mut out: O,
    mut err: E,
    interrupted: &AtomicBool,
) -> ClientResult<()>
where
    T: Transport,
    R: BufRead,
    O: Write,
    E: Write,
{
    let res = run_lines(conn, &mut input, &mut out, &mut err, interrupted);
    conn.close();
    res
}

fn run_lines<T: Transport>(
    conn: &mut Connection<T>,
    input: &mut impl BufRead,
    out: &mut impl Write,
    err: &mut impl Write,
    interrupted: &AtomicBool,
) -> ClientResult<()> {
    while !interrupted.load(Ordering::SeqCst) {
        let line = match prompt(&mut *input, &mut *err) {
            Ok(Input::Command(line)) => line,
            Ok(Input::Empty) => continue,
            Ok(Input::Exit | Input::Eof) => break,
            Err(e) if e.kind() == ErrorKind::Usage => {
                report(err, &e.to_string())?;
                continue;
            }
            Err(e) => return Err(e),
        };
        // Ctrl-C does not interrupt the blocking read, so look again.
        if interrupted.load(Ordering::SeqCst) {
            debug!("interrupted, dropping `{line}`");
            break;
        }

        let mut block = if line.ends_with(':') {
            Some(PipeSource::new(&mut *input))
        } else {
            None
        };
        let redirected = line.contains('>');
        let command = Command::line(line);
        let mut rows = PipeSink::with_linebreak(&mut *out, "\n");

        let source = block.as_mut().map(|source| source as &mut dyn DataSource);
        let sink = (!redirected).then_some(&mut rows as &mut dyn DataSink);
        match conn.execute(&command, source, sink, None) {
            Ok(_) => report(err, conn.response().unwrap_or_default())?,
            Err(e) if matches!(e.kind(), ErrorKind::Usage | ErrorKind::Processor) && !conn.is_tainted() => {
                report(err, &format!("error: {e}"))?
            }
            Err(e) => return Err(e),
        }

        if conn.is_closed() {
            debug!("peer closed the connection");
            break;
        }
    }
    Ok(())
}

fn report(err: &mut impl Write, msg: &str) -> ClientResult<()> {
    writeln!(err, "{msg}").map_err(|e| ClientError::io("failed to write to terminal", e))
}
