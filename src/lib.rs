//! Client for the line-based protocol spoken by GraphCore-style graph
//! processors.
//!
//! # Overview
//!
//! A graph processor reads commands line by line and answers each with a
//! status line, optionally followed by a data block of rows. This crate speaks
//! that protocol over TCP ([`ClientConnection`]) or over the standard streams of
//! a child process ([`SlaveConnection`]).
//!
//! # Key Components
//!
//! - [`Connection`]: the protocol engine. Validates commands, streams data
//!   blocks and classifies responses.
//! - [`Command`] and [`Validator`]: command construction and the syntax rules
//!   enforced before anything is sent.
//! - [`data`]: row sources and sinks (in memory, files and pipes).
//! - [`transport`]: the byte channels a connection runs on.
//!
//! # Example
//! ```no_run
//! use gpclient::{Connection, Row};
//!
//! let mut gp = Connection::new_client_connection(None, Some("localhost"), None);
//! gp.connect()?;
//! gp.add_arcs(vec![Row::from((1, 11)), Row::from((1, 12))])?;
//! println!("{:?}", gp.capture_list_successors(1)?);
//! # Ok::<(), gpclient::ClientError>(())
//! ```
pub mod cli;
pub mod command;
pub mod config;
pub mod connection;
pub mod data;
pub mod error;
pub mod protocol;
pub mod row;
pub mod transport;

#[cfg(test)]
mod testing;

pub use command::{Command, Validator};
pub use config::ConnectionConfig;
pub use connection::{
    Arg, ClientConnection, Connection, ConnectionState, Execution, Invocation, Outcome, SlaveConnection,
};
pub use error::{ClientError, ClientResult, ErrorKind};
pub use protocol::{CLIENT_PROTOCOL_VERSION, DEFAULT_PORT, LINEBREAK, Response};
pub use row::{Field, Row, array_column, pairs_to_map};
