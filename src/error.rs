//! Client error types.
//!
//! Every fallible operation in this crate returns [`ClientError`]. Callers that need
//! to react differently to a rejected command, a broken wire or a refusing peer
//! branch on [`ClientError::kind`] instead of matching every variant.
use std::io;

use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Coarse classification of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed command or argument, detected before any I/O.
    Usage,
    /// Transport or framing failure; the connection is no longer usable.
    Protocol,
    /// The peer answered with a failure status.
    Processor,
    /// A local file or stream failed.
    Io,
}

/// List of possible errors raised by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("{status}: {message} (command was `{command}`)")]
    Processor {
        status: String,
        message: String,
        command: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ClientError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Usage(_) => ErrorKind::Usage,
            ClientError::Protocol(_) => ErrorKind::Protocol,
            ClientError::Processor { .. } => ErrorKind::Processor,
            ClientError::Io { .. } => ErrorKind::Io,
        }
    }

    /// Status reported by the peer, for processor errors.
    pub fn status(&self) -> Option<&str> {
        match self {
            ClientError::Processor { status, .. } => Some(status),
            _ => None,
        }
    }
}
