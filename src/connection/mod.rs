//! Protocol engine.
//!
//! A [`Connection`] owns one [`Transport`] and drives the request/response cycle
//! over it: it validates and serializes a [`Command`], streams an optional data
//! block to the peer, parses the status line and copies an optional data block
//! sent back by the peer into a sink.
//!
//! # States
//!
//! A connection starts out disconnected. [`Connection::connect`] establishes the
//! transport and checks the peer's protocol version. Once connected, commands
//! run one at a time until the connection is closed. Any protocol violation
//! taints the connection: it is closed and every further command fails without
//! touching the transport. A peer refusing a command (a failure status) does
//! not taint it.
//!
//! # Example
//! ```no_run
//! use gpclient::{Command, Connection, Row};
//!
//! let mut gp = Connection::new_client_connection(Some("test"), None, None);
//! gp.connect()?;
//!
//! gp.add_arcs(vec![Row::from((1, 2)), Row::from((1, 3))])?;
//! let successors = gp.capture_list_successors(1)?;
//! assert_eq!(successors, Some(vec![Row::from((2,)), Row::from((3,))]));
//!
//! gp.run(&Command::new("clear"))?;
//! gp.close();
//! # Ok::<(), gpclient::ClientError>(())
//! ```
mod dispatch;
mod ops;

use std::{collections::HashMap, path::PathBuf};

use log::{debug, info, trace};

use crate::{
    ClientError, ClientResult, Command, ConnectionConfig, ErrorKind,
    command::Prepared,
    data::{self, DataSink, DataSource, NULL_SINK, NULL_SOURCE, RowMunger},
    protocol::{DEFAULT_PORT, LINEBREAK, MAX_PROTOCOL_VERSION, MIN_PROTOCOL_VERSION, Response},
    transport::{ClientTransport, SlaveTransport, Transport},
};

pub use dispatch::{Arg, CallHandler, ExecHandler, Execution, Invocation, Outcome};

/// Connection to a graph server over TCP.
pub type ClientConnection = Connection<ClientTransport>;

/// Connection to a graph processor child process.
pub type SlaveConnection = Connection<SlaveTransport>;

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    /// A protocol violation was observed; the connection can not be reused.
    Tainted,
    Closed,
}

/// Client side of the graph processor protocol.
pub struct Connection<T: Transport> {
    transport: T,
    config: ConnectionConfig,
    graph: Option<String>,
    connected: bool,
    closed: bool,
    tainted: bool,
    response: Option<Response>,
    raw_response: Option<String>,
    protocol_version: Option<String>,
    call_handlers: Vec<CallHandler>,
    exec_handlers: Vec<ExecHandler>,
}

impl Connection<ClientTransport> {
    /// Connection to the graph server at `host:port`, defaulting to
    /// `localhost` and [`DEFAULT_PORT`]. When `graph` is given the connection
    /// switches to that graph right after connecting.
    pub fn new_client_connection(graph: Option<&str>, host: Option<&str>, port: Option<u16>) -> Self {
        let transport = ClientTransport::new(host.unwrap_or("localhost"), port.unwrap_or(DEFAULT_PORT));
        let mut conn = Connection::new(transport, ConnectionConfig::default());
        conn.graph = graph.map(str::to_string);
        conn
    }
}

impl Connection<SlaveTransport> {
    /// Connection to a graph processor started from `command` (program and
    /// arguments).
    pub fn new_slave_connection(
        command: Vec<String>,
        cwd: Option<PathBuf>,
        env: Option<HashMap<String, String>>,
    ) -> Self {
        Connection::new(
            SlaveTransport::new(command, cwd, env),
            ConnectionConfig::default(),
        )
    }
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T, config: ConnectionConfig) -> Self {
        Self {
            transport,
            config,
            graph: None,
            connected: false,
            closed: false,
            tainted: false,
            response: None,
            raw_response: None,
            protocol_version: None,
            call_handlers: Vec::new(),
            exec_handlers: Vec::new(),
        }
    }

    /// Sets the graph to switch to after connecting.
    pub fn with_graph(mut self, graph: impl Into<String>) -> Self {
        self.graph = Some(graph.into());
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConnectionConfig {
        &mut self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> ConnectionState {
        if self.tainted {
            ConnectionState::Tainted
        } else if self.is_closed() {
            ConnectionState::Closed
        } else if self.connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_tainted(&self) -> bool {
        self.tainted
    }

    pub fn is_closed(&self) -> bool {
        self.closed || (self.connected && self.transport.is_closed())
    }

    /// Status of the last response, e.g. `OK` or `FAILED`.
    pub fn status(&self) -> Option<&str> {
        self.response.as_ref().map(|r| r.status.as_str())
    }

    /// Message of the last response.
    pub fn status_message(&self) -> Option<&str> {
        self.response.as_ref().map(|r| r.message.as_str())
    }

    /// Last response line as received.
    pub fn response(&self) -> Option<&str> {
        self.raw_response.as_deref()
    }

    pub fn last_response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// Whether the last response carried a data block.
    pub fn has_output(&self) -> bool {
        self.response.as_ref().is_some_and(|r| r.has_output)
    }

    /// Establishes the transport and checks the peer's protocol version.
    pub fn connect(&mut self) -> ClientResult<()> {
        if self.tainted || self.closed {
            return Err(ClientError::protocol("connection already closed"));
        }
        if self.connected {
            return Err(ClientError::usage("already connected"));
        }

        self.transport.set_timeout(self.config.read_timeout)?;
        self.transport.connect()?;
        self.connected = true;

        if let Err(e) = self.check_protocol_version() {
            debug!("handshake failed: {e}");
            self.transport.close();
            self.connected = false;
            self.closed = false;
            self.tainted = false;
            self.protocol_version = None;
            return Err(e);
        }

        if let Some(graph) = self.graph.clone() {
            self.use_graph(&graph)?;
        }
        info!("connected, protocol version {}", self.protocol_version.as_deref().unwrap_or("?"));
        Ok(())
    }

    fn check_protocol_version(&mut self) -> ClientResult<()> {
        let version = self.parsed_protocol_version()?;

        if version < MIN_PROTOCOL_VERSION {
            return Err(ClientError::protocol(format!(
                "Bad protocol version: expected at least {MIN_PROTOCOL_VERSION}, but peer uses {version}"
            )));
        }
        if version > MAX_PROTOCOL_VERSION {
            return Err(ClientError::protocol(format!(
                "Bad protocol version: expected at most {MAX_PROTOCOL_VERSION}, but peer uses {version}"
            )));
        }
        Ok(())
    }

    fn parsed_protocol_version(&mut self) -> ClientResult<f64> {
        let version = self.protocol_version()?;
        version
            .parse::<f64>()
            .map_err(|_| ClientError::protocol(format!("unparsable protocol version `{version}`")))
    }

    /// Fails if the peer is known to be gone.
    pub fn check_peer(&mut self) -> ClientResult<()> {
        self.transport.check_peer()
    }

    /// Closes the connection. Calling it again has no effect.
    pub fn close(&mut self) {
        if !self.closed {
            trace!("closing connection");
        }
        self.transport.close();
        self.closed = true;
    }

    fn taint(&mut self) {
        debug!("connection tainted");
        self.tainted = true;
        self.close();
    }

    fn ensure_usable(&mut self) -> ClientResult<()> {
        if self.tainted {
            return Err(ClientError::protocol("connection tainted by previous error"));
        }
        if self.is_closed() {
            return Err(ClientError::protocol("connection already closed"));
        }
        if !self.connected {
            return Err(ClientError::protocol("not connected"));
        }
        if self.transport.eof() {
            debug!("connection closed by peer, closing our side too");
            self.taint();
            return Err(ClientError::protocol("connection closed by peer"));
        }
        Ok(())
    }

    /// Runs a command without data blocks attached.
    pub fn run(&mut self, command: &Command) -> ClientResult<String> {
        self.execute(command, None, None, None)
    }

    /// Runs `command`, streaming `source` to the peer and any data block sent
    /// back into `sink`. `munger` is applied to the rows of both directions.
    ///
    /// Returns the response status. A failure status is returned as
    /// [`ClientError::Processor`] and leaves the connection usable; any other
    /// error raised after the command was sent taints it.
    pub fn execute(
        &mut self,
        command: &Command,
        source: Option<&mut dyn DataSource>,
        sink: Option<&mut dyn DataSink>,
        munger: Option<RowMunger<'_>>,
    ) -> ClientResult<String> {
        self.ensure_usable()?;

        let prepared = self
            .config
            .validator()
            .prepare(command, source.is_some(), sink.is_some())?;

        match self.exchange(&prepared, source, sink, munger) {
            Err(e) if e.kind() != ErrorKind::Processor => {
                self.taint();
                Err(e)
            }
            res => res,
        }
    }

    fn exchange(
        &mut self,
        prepared: &Prepared,
        source: Option<&mut dyn DataSource>,
        sink: Option<&mut dyn DataSink>,
        mut munger: Option<RowMunger<'_>>,
    ) -> ClientResult<String> {
        self.response = None;

        debug!(">>> {}", prepared.line);
        self.transport
            .send(format!("{}{LINEBREAK}", prepared.line).as_bytes())?;

        if prepared.expects_input {
            let mut null = NULL_SOURCE;
            let source: &mut dyn DataSource = match source {
                Some(source) => source,
                None => &mut null,
            };
            self.copy_from_source(source, reborrow(&mut munger))?;
        }

        let rec = self.transport.receive()?;
        if rec.is_empty() {
            self.raw_response = None;
            self.transport.check_peer()?;
            return Err(ClientError::protocol("peer did not respond"));
        }

        let rec = rec.trim();
        debug!("<<< {rec}");
        self.raw_response = Some(rec.to_string());

        let response = Response::try_from(rec)?;
        self.response = Some(response.clone());

        if !response.is_success() {
            return Err(ClientError::Processor {
                status: response.status,
                message: response.message,
                command: prepared.line.clone(),
            });
        }

        if response.has_output {
            let mut null = NULL_SINK;
            let sink: &mut dyn DataSink = match sink {
                Some(sink) => sink,
                None => &mut null,
            };
            self.copy_to_sink(sink, munger)?;
        }

        if self.transport.eof() {
            debug!("connection closed by peer, closing our side too");
            self.close();
        }

        Ok(response.status)
    }

    fn copy_from_source(
        &mut self,
        source: &mut dyn DataSource,
        munger: Option<RowMunger<'_>>,
    ) -> ClientResult<()> {
        let mut sink = self.transport.make_sink()?;
        let count = data::copy(source, &mut *sink, munger)?;
        drop(sink);

        self.transport.send(LINEBREAK.as_bytes())?;
        trace!("sent {count} rows");
        Ok(())
    }

    fn copy_to_sink(&mut self, sink: &mut dyn DataSink, munger: Option<RowMunger<'_>>) -> ClientResult<()> {
        let mut source = self.transport.make_source()?;
        let count = data::copy(&mut *source, sink, munger)?;
        trace!("received {count} rows");
        Ok(())
    }
}

fn reborrow<'a>(munger: &'a mut Option<RowMunger<'_>>) -> Option<RowMunger<'a>> {
    match munger {
        Some(munger) => Some(&mut **munger),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Row,
        data::{ArraySink, ArraySource},
        testing::{connected, scripted},
    };

    #[test]
    fn connect_checks_protocol_version() {
        let (transport, sent) = scripted(&["OK. 4"]);
        let mut conn = Connection::new(transport, ConnectionConfig::default());
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        conn.connect().unwrap();
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(conn.protocol_version().unwrap(), "4");
        assert_eq!(sent.contents(), "protocol-version\r\n");
    }

    #[test]
    fn connect_rejects_old_and_new_peers() {
        for version in ["OK. 1.9", "OK. 5", "VALUE: 17.2", "OK. four"] {
            let (transport, _) = scripted(&[version]);
            let mut conn = Connection::new(transport, ConnectionConfig::default());

            let err = conn.connect().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Protocol, "{version}");
            assert_eq!(conn.state(), ConnectionState::Disconnected, "{version}");
        }
    }

    #[test]
    fn connect_uses_graph() {
        let (transport, sent) = scripted(&["OK. 3.1", "OK. using graph test"]);
        let mut conn = Connection::new(transport, ConnectionConfig::default()).with_graph("test");

        conn.connect().unwrap();
        assert_eq!(sent.contents(), "protocol-version\r\nuse-graph test\r\n");
        assert_eq!(conn.status_message(), Some("using graph test"));
    }

    #[test]
    fn execute_before_connect() {
        let (transport, sent) = scripted(&["OK."]);
        let mut conn = Connection::new(transport, ConnectionConfig::default());

        let err = conn.run(&Command::new("clear")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(sent.contents(), "");
    }

    #[test]
    fn add_arcs_then_list_successors() {
        let (mut conn, sent) = connected(&["OK. added 2 arcs", "OK. 2 items:", "2", "3", ""]);

        let mut arcs = ArraySource::new(vec![Row::from((1, 2)), Row::from((1, 3))]);
        let status = conn
            .execute(&Command::new("add-arcs"), Some(&mut arcs), None, None)
            .unwrap();
        assert_eq!(status, "OK");

        let mut sink = ArraySink::new();
        conn.execute(&Command::new("list-successors").arg(1), None, Some(&mut sink), None)
            .unwrap();

        assert_eq!(sink.into_rows(), vec![Row::from((2,)), Row::from((3,))]);
        assert!(conn.has_output());
        assert_eq!(
            sent.contents(),
            "add-arcs:\r\n1,2\r\n1,3\r\n\r\nlist-successors 1\r\n"
        );
    }

    #[test]
    fn add_arcs_acknowledged_without_output() {
        let (mut conn, sent) = connected(&["OK:", "OK. 2 items:", "2", "3", ""]);

        let mut arcs = ArraySource::new(vec![Row::from((1, 2)), Row::from((1, 3))]);
        conn.execute(&Command::line("add-arcs:"), Some(&mut arcs), None, None)
            .unwrap();
        assert!(!conn.has_output());

        let successors = conn
            .invoke("CaptureListSuccessors", vec![1.into()])
            .unwrap();
        assert_eq!(
            successors.into_rows(),
            Some(vec![Row::from((2,)), Row::from((3,))])
        );
        assert_eq!(
            sent.contents(),
            "add-arcs:\r\n1,2\r\n1,3\r\n\r\nlist-successors 1\r\n"
        );
    }

    #[test]
    fn privileged_command_denied() {
        let (mut conn, _) = connected(&["DENIED: not authorized", "DENIED: not authorized"]);

        let err = conn.invoke("clear", vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Processor);
        assert_eq!(err.status(), Some("DENIED"));

        let outcome = conn.invoke("try_clear", vec![]).unwrap();
        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(conn.status(), Some("DENIED"));
        assert_eq!(conn.status_message(), Some("not authorized"));
        assert_eq!(conn.state(), ConnectionState::Connected);
    }

    #[test]
    fn empty_row_can_not_end_block_early() {
        let (mut conn, sent) = connected(&["OK."]);

        let mut arcs = ArraySource::new(vec![
            Row::from((1, 2)),
            Row::new(vec![]),
            Row::from((3, 4)),
        ]);
        let err = conn
            .execute(&Command::new("add-arcs"), Some(&mut arcs), None, None)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(conn.state(), ConnectionState::Tainted);
        assert_eq!(sent.contents(), "add-arcs:\r\n1,2\r\n");
    }

    #[test]
    fn line_break_in_field_can_not_inject_commands() {
        let (mut conn, sent) = connected(&["OK."]);

        let mut nodes = ArraySource::new(vec![Row::from(("x\r\n\r\nclear",))]);
        let err = conn
            .execute(&Command::new("add-nodes"), Some(&mut nodes), None, None)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(conn.is_tainted());
        assert_eq!(sent.contents(), "add-nodes:\r\n");
    }

    #[test]
    fn trailing_colon_sends_empty_block() {
        let (mut conn, sent) = connected(&["OK."]);

        conn.run(&Command::line("add-arcs:")).unwrap();
        assert_eq!(sent.contents(), "add-arcs:\r\n\r\n");
    }

    #[test]
    fn munger_applies_to_both_directions() {
        let (mut conn, sent) = connected(&["OK.", "OK. 2 items:", "5", "6", ""]);
        let mut bump = |row: Row| {
            let i = row.get(0)?.as_int()?;
            (i != 6).then(|| Row::from((i + 100,)))
        };

        let mut source = ArraySource::new(vec![Row::from((1,)), Row::from((6,))]);
        conn.execute(&Command::new("add-nodes"), Some(&mut source), None, Some(&mut bump))
            .unwrap();

        let mut sink = ArraySink::new();
        conn.execute(&Command::new("list-roots"), None, Some(&mut sink), Some(&mut bump))
            .unwrap();

        assert_eq!(sent.contents(), "add-nodes:\r\n101\r\n\r\nlist-roots\r\n");
        assert_eq!(sink.into_rows(), vec![Row::from((105,))]);
    }

    #[test]
    fn output_without_sink_is_discarded() {
        let (mut conn, _) = connected(&["OK. 2 items:", "1", "2", "", "OK. 0"]);

        conn.run(&Command::new("list-roots")).unwrap();
        conn.run(&Command::new("stats")).unwrap();
        assert_eq!(conn.status_message(), Some("0"));
    }

    #[test]
    fn processor_error_keeps_connection() {
        let (mut conn, _) = connected(&["FAILED! unknown command", "OK."]);

        let err = conn.run(&Command::new("foo").arg(1)).unwrap_err();
        match err {
            ClientError::Processor {
                ref status,
                ref message,
                ref command,
            } => {
                assert_eq!(status, "FAILED");
                assert_eq!(message, "unknown command");
                assert_eq!(command, "foo 1");
            }
            _ => panic!("unexpected error {err:?}"),
        }
        assert_eq!(conn.status(), Some("FAILED"));
        assert_eq!(conn.state(), ConnectionState::Connected);

        assert_eq!(conn.run(&Command::new("clear")).unwrap(), "OK");
    }

    #[test]
    fn usage_error_sends_nothing() {
        let (mut conn, sent) = connected(&["OK."]);

        let err = conn.run(&Command::new("foo").arg("1337 x")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(sent.contents(), "");
        assert_eq!(conn.state(), ConnectionState::Connected);

        conn.run(&Command::new("foo").arg("1337x")).unwrap();
        assert_eq!(sent.contents(), "foo 1337x\r\n");
    }

    #[test]
    fn redirection_and_local_streams() {
        let (mut conn, sent) = connected(&["OK."]);
        let cmd = Command::line("clear > /tmp/out");

        let err = conn.run(&cmd).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);

        conn.config_mut().allow_pipes = true;
        let mut sink = ArraySink::new();
        let err = conn.execute(&cmd, None, Some(&mut sink), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(sent.contents(), "");

        conn.run(&cmd).unwrap();
        assert_eq!(sent.contents(), "clear > /tmp/out\r\n");
    }

    #[test]
    fn garbage_response_taints() {
        let (mut conn, sent) = connected(&["this is not a status line", "OK."]);

        let err = conn.run(&Command::new("clear")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(conn.state(), ConnectionState::Tainted);
        assert!(conn.is_closed());
        assert_eq!(conn.response(), Some("this is not a status line"));

        sent.clear();
        let err = conn.run(&Command::new("clear")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(sent.contents(), "");
    }

    #[test]
    fn missing_response_taints() {
        let (mut conn, _) = connected(&[]);

        let err = conn.run(&Command::new("clear")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(conn.is_tainted());
        assert_eq!(conn.status(), None);
    }

    #[test]
    fn data_block_cut_short_by_hangup() {
        let (mut conn, _) = connected(&["OK. bye:", "1"]);

        let mut sink = ArraySink::new();
        conn.execute(&Command::new("shutdown"), None, Some(&mut sink), None)
            .unwrap();
        assert_eq!(sink.rows(), &[Row::from((1,))]);
    }

    #[test]
    fn peer_hangup_taints() {
        let (mut conn, sent) = connected(&["OK. bye"]);
        conn.run(&Command::new("shutdown")).unwrap();

        let err = conn.run(&Command::new("clear")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(conn.state(), ConnectionState::Tainted);

        sent.clear();
        conn.run(&Command::new("clear")).unwrap_err();
        assert_eq!(sent.contents(), "");
    }

    #[test]
    fn close_is_idempotent() {
        let (mut conn, sent) = connected(&["OK."]);
        conn.close();
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);

        let err = conn.run(&Command::new("clear")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(sent.contents(), "");
        assert!(conn.connect().is_err());
    }
}
