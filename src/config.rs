//! Connection configuration.
use std::time::Duration;

use crate::Validator;

/// Configuration for a [`Connection`](crate::Connection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Accept `<`/`>` redirection to files on the peer's side.
    pub allow_pipes: bool,
    /// Restrict command arguments to word tokens.
    pub strict_arguments: bool,
    /// Read timeout applied to the transport once connected.
    pub read_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            allow_pipes: false,
            strict_arguments: true,
            read_timeout: None,
        }
    }
}

impl ConnectionConfig {
    pub fn allow_pipes(mut self, allow: bool) -> Self {
        self.allow_pipes = allow;
        self
    }

    pub fn strict_arguments(mut self, strict: bool) -> Self {
        self.strict_arguments = strict;
        self
    }

    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub(crate) fn validator(&self) -> Validator {
        Validator {
            allow_pipes: self.allow_pipes,
            strict_arguments: self.strict_arguments,
        }
    }
}
