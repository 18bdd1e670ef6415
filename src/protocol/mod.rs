//! Graph processor wire protocol.
//!
//! This module holds the constants and the response parser of the line-based
//! protocol spoken between a client and a graph processor peer.
//!
//! # Overview
//!
//! Every exchange starts with one command line sent by the client:
//!
//! ```text
//! <command-name>[ <arg>]*[:]
//! ```
//!
//! A trailing `:` announces a data block following the command. A data block is
//! zero or more encoded [`Row`](crate::Row)s, one per line, terminated by exactly
//! one blank line.
//!
//! The peer answers with a status line:
//!
//! ```text
//! STATUS<sep><message>[:]
//! ```
//!
//! where `STATUS` consists of letters only and `<sep>` is one of `.`, `:` or `!`.
//! `OK`, `NONE` and `VALUE` mean success, every other status is a failure. A
//! trailing `:` on the message announces a data block sent by the peer.
//!
//! Lines are written with CRLF; a bare LF is accepted when reading.
//!
//! # Key Components
//!
//! - [`Response`]: Parsed status line.
mod response;

pub use response::Response;

/// Line terminator written to the peer.
pub const LINEBREAK: &str = "\r\n";

/// Default TCP port of a graph server.
pub const DEFAULT_PORT: u16 = 6666;

/// Protocol version implemented by this client.
pub const CLIENT_PROTOCOL_VERSION: u32 = 4;

/// Oldest peer protocol version this client talks to.
pub const MIN_PROTOCOL_VERSION: f64 = 2.0;

/// Newest peer protocol version this client talks to.
pub const MAX_PROTOCOL_VERSION: f64 = 4.99;

/// Statuses that denote success.
pub const SUCCESS_STATUSES: [&str; 3] = ["OK", "NONE", "VALUE"];
