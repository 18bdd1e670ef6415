use std::{
    io::{BufReader, BufWriter},
    net::{Shutdown, TcpStream},
    time::Duration,
};

use log::{debug, info};

use crate::{
    ClientError, ClientResult,
    data::{DataSink, DataSource},
    protocol::DEFAULT_PORT,
};

use super::{PipeTransport, Transport};

/// TCP connection to a graph server.
#[derive(Debug)]
pub struct ClientTransport {
    host: String,
    port: u16,
    timeout: Option<Duration>,
    socket: Option<TcpStream>,
    pipes: PipeTransport<BufReader<TcpStream>, BufWriter<TcpStream>>,
}

impl ClientTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: None,
            socket: None,
            pipes: PipeTransport::default(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for ClientTransport {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

impl Transport for ClientTransport {
    fn connect(&mut self) -> ClientResult<()> {
        let connect_error = |e| {
            ClientError::protocol(format!(
                "failed to connect to {}:{}: {e}",
                self.host, self.port
            ))
        };

        let socket = TcpStream::connect((self.host.as_str(), self.port)).map_err(connect_error)?;
        socket.set_read_timeout(self.timeout).map_err(connect_error)?;
        let hin = socket.try_clone().map_err(connect_error)?;
        let hout = socket.try_clone().map_err(connect_error)?;

        info!("connected to {}:{}", self.host, self.port);
        self.pipes.bind(BufReader::new(hin), BufWriter::new(hout));
        self.socket = Some(socket);
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> ClientResult<()> {
        self.pipes.send(data)
    }

    fn receive(&mut self) -> ClientResult<String> {
        self.pipes.receive()
    }

    fn eof(&self) -> bool {
        self.pipes.eof()
    }

    fn is_closed(&self) -> bool {
        self.pipes.is_closed()
    }

    fn close(&mut self) {
        self.pipes.close();

        if let Some(socket) = self.socket.take() {
            debug!("closing socket to {}:{}", self.host, self.port);
            if let Err(e) = socket.shutdown(Shutdown::Both) {
                debug!("socket shutdown failed: {e}");
            }
        }
    }

    fn make_source(&mut self) -> ClientResult<Box<dyn DataSource + '_>> {
        self.pipes.make_source()
    }

    fn make_sink(&mut self) -> ClientResult<Box<dyn DataSink + '_>> {
        self.pipes.make_sink()
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> ClientResult<()> {
        self.timeout = timeout;
        if let Some(socket) = &self.socket {
            socket
                .set_read_timeout(timeout)
                .map_err(|e| ClientError::protocol(format!("failed to set timeout: {e}")))?;
        }
        Ok(())
    }
}

impl Drop for ClientTransport {
    fn drop(&mut self) {
        self.close();
    }
}
