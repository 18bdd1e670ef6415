use std::collections::HashMap;

use crate::{
    ClientError, ClientResult, Command, Field, Row,
    data::DataSink,
    protocol::{MAX_PROTOCOL_VERSION, MIN_PROTOCOL_VERSION},
    transport::Transport,
};

use super::{Arg, Connection, Outcome};

impl<T: Transport> Connection<T> {
    /// Protocol version reported by the peer. Cached after the first call.
    pub fn protocol_version(&mut self) -> ClientResult<String> {
        if let Some(version) = &self.protocol_version {
            return Ok(version.clone());
        }

        self.run(&Command::new("protocol-version"))?;
        let version = self.status_message().unwrap_or_default().trim().to_string();
        self.protocol_version = Some(version.clone());
        Ok(version)
    }

    /// Checks that the peer's protocol version lies in `min..=max`, defaulting
    /// to the range this client supports.
    pub fn supports_protocol_version(&mut self, min: Option<f64>, max: Option<f64>) -> ClientResult<bool> {
        let version = self.parsed_protocol_version()?;
        Ok(version >= min.unwrap_or(MIN_PROTOCOL_VERSION) && version <= max.unwrap_or(MAX_PROTOCOL_VERSION))
    }

    /// Round trip to the peer. Returns the response status.
    pub fn ping(&mut self) -> ClientResult<String> {
        self.run(&Command::new("protocol-version"))
    }

    pub fn use_graph(&mut self, graph: &str) -> ClientResult<String> {
        self.run(&Command::new("use-graph").arg(graph))
    }

    pub fn authorize(&mut self, method: &str, credentials: &str) -> ClientResult<String> {
        self.run(&Command::new("authorize").arg(method).arg(credentials))
    }

    pub fn add_arcs(&mut self, arcs: Vec<Row>) -> ClientResult<String> {
        let outcome = self.invoke("add_arcs", vec![Arg::Rows(arcs)])?;
        Ok(outcome.value().unwrap_or_default().to_string())
    }

    /// Direct successors of `node`, or `None` if the peer answers `NONE`.
    pub fn capture_list_successors(&mut self, node: i64) -> ClientResult<Option<Vec<Row>>> {
        match self.invoke("capture_list_successors", vec![node.into()])? {
            Outcome::Rows(rows) => Ok(Some(rows)),
            Outcome::Done => Ok(Some(Vec::new())),
            _ => Ok(None),
        }
    }

    pub fn capture_stats_map(&mut self) -> ClientResult<HashMap<Field, Field>> {
        match self.invoke("capture_stats_map", vec![])? {
            Outcome::Map(map) => Ok(map),
            Outcome::Done => Ok(HashMap::new()),
            other => Err(ClientError::protocol(format!(
                "stats returned no data: {other:?}"
            ))),
        }
    }

    /// Nodes reachable from `id` within `depth` steps, minus those reachable
    /// from `without` within `without_depth` (defaulting to `depth`).
    pub fn traverse_successors_without(
        &mut self,
        id: i64,
        depth: i64,
        without: i64,
        without_depth: Option<i64>,
        sink: &mut dyn DataSink,
    ) -> ClientResult<String> {
        let outcome = self.invoke(
            "traverse_successors_without",
            vec![
                id.into(),
                depth.into(),
                without.into(),
                without_depth.into(),
                Arg::sink(sink),
            ],
        )?;
        Ok(outcome.value().unwrap_or_default().to_string())
    }
}
