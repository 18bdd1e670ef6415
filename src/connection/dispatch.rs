//! Dynamic command invocation.
//!
//! [`Connection::invoke`] turns an operation name like `capture_list_successors`
//! into a command, marshals its arguments and shapes the result according to
//! the modifiers encoded in the name:
//!
//! - `try_` prefix: a failure status yields [`Outcome::Failed`] instead of an
//!   error.
//! - `capture_` prefix: the data block is collected into rows.
//! - `_map` suffix (requires `capture_`): two-column rows become a map.
//! - `_value` suffix (excludes `capture_`): the status message is returned.
//!
//! Two kinds of hooks can be registered. Call handlers see the decoded
//! [`Invocation`] and may answer it outright. Exec handlers run once the
//! command is built and may rewrite it, or answer it in place of the peer by
//! filling in an [`Execution`]; the answer is then shaped like a peer response.
use std::collections::HashMap;

use log::debug;

use crate::{
    ClientError, ClientResult, Command, ErrorKind, Field, Response, Row,
    command::is_valid_command_argument,
    data::{ArraySink, ArraySource, DataSink, DataSource, RowMunger},
    transport::Transport,
};

use super::Connection;

/// Hook run before a command is dispatched. Returning `Some` skips the command
/// and makes the returned outcome the result of the invocation.
pub type CallHandler = Box<dyn FnMut(&mut Invocation) -> Option<Outcome>>;

/// Hook run on the built command before it is sent. Returning `false` skips
/// the peer; the [`Execution::response`] left by the handler stands in for its
/// answer.
pub type ExecHandler = Box<dyn FnMut(&mut Execution<'_>) -> bool>;

/// Command about to be sent by [`Connection::invoke`], as seen by an exec
/// handler.
pub struct Execution<'a> {
    pub command: Command,
    pub source: Option<&'a mut dyn DataSource>,
    pub sink: Option<&'a mut dyn DataSink>,
    /// Used as the response when a handler skips the peer. Defaults to a bare
    /// `OK`.
    pub response: Response,
}

type Override = fn(&[Field]) -> ClientResult<Command>;

/// Commands composed on the client side instead of being sent as named.
fn override_for(command: &str) -> Option<Override> {
    match command {
        "traverse-successors-without" => Some(traverse_successors_without),
        _ => None,
    }
}

/// Operation name decoded into a protocol command and its modifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub try_it: bool,
    pub capture: bool,
    pub map: bool,
    pub value: bool,
    /// Scalar arguments, filled in by [`Connection::invoke`].
    pub args: Vec<Field>,
}

impl Invocation {
    /// Decodes an operation name. Underscores and CamelCase humps become
    /// dashes.
    pub fn parse(name: &str) -> ClientResult<Self> {
        let normalized = normalize(name);
        let mut command = normalized.trim_start_matches('-');

        let try_it = strip_prefix(&mut command, "try-");
        let capture = strip_prefix(&mut command, "capture-");
        command = command.trim_end_matches('-');

        let map = strip_suffix(&mut command, "-map");
        if map && !capture {
            return Err(ClientError::usage(format!(
                "the _map modifier requires the capture_ prefix: {name}"
            )));
        }

        let value = strip_suffix(&mut command, "-value");
        if value && capture {
            return Err(ClientError::usage(format!(
                "the _value modifier can not be combined with capture_: {name}"
            )));
        }

        if command.is_empty() {
            return Err(ClientError::usage(format!("no command in `{name}`")));
        }

        Ok(Self {
            command: command.to_string(),
            try_it,
            capture,
            map,
            value,
            args: Vec::new(),
        })
    }
}

fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 && !out.ends_with('-') {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else if c == '_' {
            out.push('-');
        } else {
            out.push(c);
        }
    }
    out
}

fn strip_prefix(command: &mut &str, prefix: &str) -> bool {
    match command.strip_prefix(prefix) {
        Some(rest) => {
            *command = rest;
            true
        }
        None => false,
    }
}

fn strip_suffix(command: &mut &str, suffix: &str) -> bool {
    match command.strip_suffix(suffix) {
        Some(rest) => {
            *command = rest;
            true
        }
        None => false,
    }
}

/// Argument to [`Connection::invoke`].
pub enum Arg<'a> {
    Value(Field),
    /// Rows sent to the peer as the input data block.
    Rows(Vec<Row>),
    Source(&'a mut dyn DataSource),
    Sink(&'a mut dyn DataSink),
    Munger(RowMunger<'a>),
    /// Placeholder that is dropped from the command line.
    Skip,
}

impl<'a> Arg<'a> {
    pub fn source(source: &'a mut dyn DataSource) -> Self {
        Arg::Source(source)
    }

    pub fn sink(sink: &'a mut dyn DataSink) -> Self {
        Arg::Sink(sink)
    }

    pub fn munger(munger: RowMunger<'a>) -> Self {
        Arg::Munger(munger)
    }

    pub fn rows<R: Into<Row>>(rows: impl IntoIterator<Item = R>) -> Self {
        Arg::Rows(rows.into_iter().map(Into::into).collect())
    }
}

impl From<Field> for Arg<'_> {
    fn from(value: Field) -> Self {
        Arg::Value(value)
    }
}

impl From<i64> for Arg<'_> {
    fn from(value: i64) -> Self {
        Arg::Value(value.into())
    }
}

impl From<i32> for Arg<'_> {
    fn from(value: i32) -> Self {
        Arg::Value(value.into())
    }
}

impl From<u32> for Arg<'_> {
    fn from(value: u32) -> Self {
        Arg::Value(value.into())
    }
}

impl From<&str> for Arg<'_> {
    fn from(value: &str) -> Self {
        Arg::Value(value.into())
    }
}

impl From<String> for Arg<'_> {
    fn from(value: String) -> Self {
        Arg::Value(value.into())
    }
}

impl From<Vec<Row>> for Arg<'_> {
    fn from(rows: Vec<Row>) -> Self {
        Arg::Rows(rows)
    }
}

impl<'a, T: Into<Arg<'a>>> From<Option<T>> for Arg<'a> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Arg::Skip, Into::into)
    }
}

/// Result of [`Connection::invoke`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Response status of a plain invocation.
    Status(String),
    /// Status message, for `_value` invocations.
    Value(String),
    /// Captured data block.
    Rows(Vec<Row>),
    /// Captured data block as a map.
    Map(HashMap<Field, Field>),
    /// Captured invocation that succeeded without a data block.
    Done,
    /// Captured invocation answered with `NONE`.
    Nothing,
    /// `try_` invocation refused by the peer.
    Failed,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failed | Outcome::Nothing)
    }

    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            Outcome::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn into_rows(self) -> Option<Vec<Row>> {
        match self {
            Outcome::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<HashMap<Field, Field>> {
        match self {
            Outcome::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Outcome::Value(value) | Outcome::Status(value) => Some(value),
            _ => None,
        }
    }
}

enum Input<'a> {
    None,
    Rows(ArraySource),
    Source(&'a mut dyn DataSource),
}

impl<T: Transport> Connection<T> {
    /// Registers a hook consulted before every [`Connection::invoke`].
    pub fn add_call_handler(&mut self, handler: impl FnMut(&mut Invocation) -> Option<Outcome> + 'static) {
        self.call_handlers.push(Box::new(handler));
    }

    pub fn clear_call_handlers(&mut self) {
        self.call_handlers.clear();
    }

    /// Registers a hook run on every command built by [`Connection::invoke`].
    /// Handlers run in order until one returns `false`.
    pub fn add_exec_handler(&mut self, handler: impl FnMut(&mut Execution<'_>) -> bool + 'static) {
        self.exec_handlers.push(Box::new(handler));
    }

    pub fn clear_exec_handlers(&mut self) {
        self.exec_handlers.clear();
    }

    /// Invokes the operation `name`. See the module documentation for the
    /// modifiers recognized in the name.
    pub fn invoke(&mut self, name: &str, args: Vec<Arg<'_>>) -> ClientResult<Outcome> {
        let mut invocation = Invocation::parse(name)?;

        let mut input = Input::None;
        let mut sink: Option<&mut dyn DataSink> = None;
        let mut munger: Option<RowMunger<'_>> = None;

        for arg in args {
            match arg {
                Arg::Value(value) => invocation.args.push(value),
                Arg::Rows(rows) => input = Input::Rows(ArraySource::new(rows)),
                Arg::Source(source) => input = Input::Source(source),
                Arg::Sink(s) => {
                    if invocation.capture {
                        return Err(ClientError::usage(format!(
                            "can't capture output into a given sink: {name}"
                        )));
                    }
                    sink = Some(s);
                }
                Arg::Munger(m) => munger = Some(m),
                Arg::Skip => {}
            }
        }

        if let Some(outcome) = self
            .call_handlers
            .iter_mut()
            .find_map(|handler| handler(&mut invocation))
        {
            debug!("invocation of {} handled by call handler", invocation.command);
            return Ok(outcome);
        }

        let command = match override_for(&invocation.command) {
            Some(build) => build(&invocation.args)?,
            None => Command::Call {
                name: invocation.command.clone(),
                args: invocation.args.clone(),
            },
        };

        let mut captured = invocation.capture.then(ArraySink::new);
        let source: Option<&mut dyn DataSource> = match &mut input {
            Input::None => None,
            Input::Rows(rows) => Some(rows as &mut dyn DataSource),
            Input::Source(source) => Some(&mut **source),
        };
        let sink: Option<&mut dyn DataSink> = match captured.as_mut() {
            Some(captured) => Some(captured as &mut dyn DataSink),
            None => sink,
        };

        let mut exec = Execution {
            command,
            source,
            sink,
            response: Response {
                status: "OK".to_string(),
                message: String::new(),
                has_output: false,
            },
        };
        let send = self.exec_handlers.iter_mut().all(|handler| handler(&mut exec));
        let Execution {
            command,
            source,
            sink,
            response,
        } = exec;

        let result = if send {
            self.execute(&command, source, sink, munger)
        } else {
            debug!("`{command}` answered by exec handler: {}", response.status);
            self.answer_locally(&command, response)
        };

        let status = match result {
            Ok(status) => status,
            Err(e) if invocation.try_it && e.kind() == ErrorKind::Processor => {
                debug!("{} was refused: {e}", invocation.command);
                return Ok(Outcome::Failed);
            }
            Err(e) => return Err(e),
        };

        if let Some(captured) = captured {
            return Ok(match status.as_str() {
                "OK" | "VALUE" if self.has_output() => {
                    if invocation.map {
                        Outcome::Map(captured.to_map()?)
                    } else {
                        Outcome::Rows(captured.into_rows())
                    }
                }
                "OK" | "VALUE" => Outcome::Done,
                "NONE" => Outcome::Nothing,
                _ => Outcome::Failed,
            });
        }

        if invocation.value {
            return match status.as_str() {
                "OK" | "VALUE" => Ok(Outcome::Value(
                    self.status_message().unwrap_or_default().to_string(),
                )),
                _ => Err(ClientError::usage(format!(
                    "can't apply _value modifier to a {status} response of {}",
                    invocation.command
                ))),
            };
        }

        Ok(Outcome::Status(status))
    }
}

impl<T: Transport> Connection<T> {
    /// Records `response` as if the peer had sent it for `command`.
    fn answer_locally(&mut self, command: &Command, response: Response) -> ClientResult<String> {
        self.ensure_usable()?;
        self.raw_response = None;
        self.response = Some(response.clone());

        if !response.is_success() {
            return Err(ClientError::Processor {
                status: response.status,
                message: response.message,
                command: command.to_string(),
            });
        }
        Ok(response.status)
    }
}

fn traverse_successors_without(args: &[Field]) -> ClientResult<Command> {
    let (id, depth, without, without_depth) = match args {
        [id, depth, without] => (id, depth, without, depth),
        [id, depth, without, without_depth] => (id, depth, without, without_depth),
        _ => {
            return Err(ClientError::usage(
                "traverse-successors-without takes id, depth, without and an optional without-depth",
            ));
        }
    };

    let args = [id, depth, without, without_depth].map(Field::to_string);
    if let Some(bad) = args.iter().find(|arg| !is_valid_command_argument(arg, true)) {
        return Err(ClientError::usage(format!("invalid argument: {bad}")));
    }

    let [id, depth, without, without_depth] = args;
    Ok(Command::line(format!(
        "traverse-successors {id} {depth} &&! traverse-successors {without} {without_depth}"
    )))
}
