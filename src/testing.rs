//! Scripted peers for unit tests.
use std::{
    io::{self, Cursor, Write},
    sync::{Arc, Mutex},
};

use crate::{Connection, ConnectionConfig, protocol::LINEBREAK, transport::PipeTransport};

pub type ScriptedTransport = PipeTransport<Cursor<Vec<u8>>, Recorder>;

/// Writer keeping everything written to it, shared with the test.
#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<u8>>>);

impl Recorder {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

impl Write for Recorder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Transport replaying `lines` as the peer's output.
pub fn scripted(lines: &[&str]) -> (ScriptedTransport, Recorder) {
    let script: String = lines.iter().map(|line| format!("{line}{LINEBREAK}")).collect();
    let sent = Recorder::default();
    let transport = PipeTransport::new(Cursor::new(script.into_bytes()), sent.clone());
    (transport, sent)
}

/// Connection past the version handshake, replaying `lines` afterwards.
pub fn connected(lines: &[&str]) -> (Connection<ScriptedTransport>, Recorder) {
    let mut script = vec!["OK. 4"];
    script.extend_from_slice(lines);

    let (transport, sent) = scripted(&script);
    let mut conn = Connection::new(transport, ConnectionConfig::default());
    conn.connect().unwrap();
    sent.clear();
    (conn, sent)
}
