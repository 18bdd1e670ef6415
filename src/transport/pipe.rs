use std::io::{self, BufRead, Write};

use log::{debug, trace};

use crate::{
    ClientError, ClientResult,
    data::{DataSink, DataSource, PipeSink, PipeSource},
};

use super::Transport;

/// Line transport over a reader and a writer.
///
/// Constructed with [`PipeTransport::new`] the pipes are already connected, so
/// [`Transport::connect`] only checks that they have not been closed.
#[derive(Debug)]
pub struct PipeTransport<R, W> {
    hin: Option<R>,
    hout: Option<W>,
    eof: bool,
    closed: bool,
}

impl<R, W> Default for PipeTransport<R, W> {
    fn default() -> Self {
        Self {
            hin: None,
            hout: None,
            eof: false,
            closed: false,
        }
    }
}

impl<R: BufRead, W: Write> PipeTransport<R, W> {
    pub fn new(hin: R, hout: W) -> Self {
        let mut transport = Self::default();
        transport.bind(hin, hout);
        transport
    }

    pub(crate) fn bind(&mut self, hin: R, hout: W) {
        self.hin = Some(hin);
        self.hout = Some(hout);
        self.eof = false;
        self.closed = false;
    }

    fn reader(&mut self) -> ClientResult<&mut R> {
        self.hin
            .as_mut()
            .ok_or_else(|| ClientError::protocol("transport is not connected"))
    }

    fn writer(&mut self) -> ClientResult<&mut W> {
        self.hout
            .as_mut()
            .ok_or_else(|| ClientError::protocol("transport is not connected"))
    }
}

fn read_failure(e: io::Error) -> ClientError {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
            ClientError::protocol(format!("timed out waiting for peer: {e}"))
        }
        _ => ClientError::protocol(format!("failed to read from peer: {e}")),
    }
}

impl<R: BufRead, W: Write> Transport for PipeTransport<R, W> {
    fn connect(&mut self) -> ClientResult<()> {
        if self.hin.is_none() || self.hout.is_none() {
            return Err(ClientError::protocol("no pipes to connect"));
        }
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> ClientResult<()> {
        let hout = self.writer()?;
        hout.write_all(data)
            .and_then(|_| hout.flush())
            .map_err(|e| ClientError::protocol(format!("failed to send data to peer, broken pipe: {e}")))
    }

    fn receive(&mut self) -> ClientResult<String> {
        let mut line = String::new();
        let read = self.reader()?.read_line(&mut line).map_err(read_failure)?;
        if read == 0 {
            debug!("peer closed the stream");
            self.eof = true;
        }
        Ok(line)
    }

    fn eof(&self) -> bool {
        self.eof
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }

        trace!("closing pipes");
        if let Some(mut hout) = self.hout.take() {
            if let Err(e) = hout.flush() {
                debug!("flush on close failed: {e}");
            }
        }
        self.hin = None;
        self.closed = true;
    }

    fn make_source(&mut self) -> ClientResult<Box<dyn DataSource + '_>> {
        let hin = self.reader()?;
        Ok(Box::new(PipeSource::new(hin)))
    }

    fn make_sink(&mut self) -> ClientResult<Box<dyn DataSink + '_>> {
        let hout = self.writer()?;
        Ok(Box::new(PipeSink::new(hout)))
    }
}
