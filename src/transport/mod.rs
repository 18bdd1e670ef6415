//! Byte-level connections to a graph processor peer.
//!
//! A [`Transport`] moves command lines and data blocks to the peer and reads
//! lines back. It also hands out a [`DataSource`] and [`DataSink`] bound to its
//! own stream, which the connection uses to copy a single data block.
//!
//! # Key Components
//!
//! - [`PipeTransport`]: line transport over any reader/writer pair. The other
//!   transports are built on it.
//! - [`ClientTransport`]: TCP connection to a graph server.
//! - [`SlaveTransport`]: a child process spoken to over its stdin and stdout.
mod pipe;
mod slave;
mod tcp;

use std::time::Duration;

use crate::{
    ClientResult,
    data::{DataSink, DataSource},
};

pub use pipe::PipeTransport;
pub use slave::SlaveTransport;
pub use tcp::ClientTransport;

/// Connection to a peer.
pub trait Transport {
    /// Establishes the underlying channel.
    fn connect(&mut self) -> ClientResult<()>;

    /// Writes all of `data` and flushes it.
    fn send(&mut self, data: &[u8]) -> ClientResult<()>;

    /// Reads one line, including its terminator. Returns an empty string once
    /// the peer closed the stream, after which [`Transport::eof`] is `true`.
    fn receive(&mut self) -> ClientResult<String>;

    fn eof(&self) -> bool;

    fn is_closed(&self) -> bool;

    /// Releases the channel. Calling it again has no effect.
    fn close(&mut self);

    /// Source reading one data block from the peer.
    fn make_source(&mut self) -> ClientResult<Box<dyn DataSource + '_>>;

    /// Sink writing one data block to the peer.
    fn make_sink(&mut self) -> ClientResult<Box<dyn DataSink + '_>>;

    /// Fails if the peer is known to be gone.
    fn check_peer(&mut self) -> ClientResult<()> {
        Ok(())
    }

    /// Sets the read timeout of [`Transport::receive`].
    fn set_timeout(&mut self, _timeout: Option<Duration>) -> ClientResult<()> {
        Ok(())
    }
}
