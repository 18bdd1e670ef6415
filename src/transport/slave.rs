use std::{
    collections::HashMap,
    env,
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use crate::{
    ClientError, ClientResult,
    data::{DataSink, DataSource},
};

use super::{PipeTransport, Transport};

/// Time a child gets to exit after its stdin was closed, before it is killed.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Graph processor running as a child process, driven over its stdin/stdout.
#[derive(Debug)]
pub struct SlaveTransport {
    command: Vec<String>,
    cwd: Option<PathBuf>,
    env: Option<HashMap<String, String>>,
    process: Option<Child>,
    pipes: PipeTransport<BufReader<ChildStdout>, ChildStdin>,
}

impl SlaveTransport {
    /// `command` is the program followed by its arguments. When `env` is given
    /// it replaces the environment of the child entirely.
    pub fn new(
        command: Vec<String>,
        cwd: Option<PathBuf>,
        env: Option<HashMap<String, String>>,
    ) -> Self {
        Self {
            command,
            cwd,
            env,
            process: None,
            pipes: PipeTransport::default(),
        }
    }

    /// Splits a command line on whitespace.
    pub fn from_command_line(line: &str) -> Self {
        Self::new(
            line.split_whitespace().map(str::to_string).collect(),
            None,
            None,
        )
    }

    /// Resolves and checks the program to execute.
    pub fn make_command(command: &[String]) -> ClientResult<PathBuf> {
        let program = match command.first() {
            Some(program) if !program.is_empty() => program,
            _ => return Err(ClientError::usage("empty command given")),
        };

        let path = resolve_program(program)
            .ok_or_else(|| ClientError::protocol(format!("file does not exist: {program}")))?;

        let meta = fs::metadata(&path).map_err(|e| {
            ClientError::protocol(format!("file does not exist: {}: {e}", path.display()))
        })?;
        if !meta.is_file() {
            return Err(ClientError::protocol(format!(
                "not a file: {}",
                path.display()
            )));
        }
        if File::open(&path).is_err() {
            return Err(ClientError::protocol(format!(
                "file is not readable: {}",
                path.display()
            )));
        }
        if !is_executable(&meta) {
            return Err(ClientError::protocol(format!(
                "file is not executable: {}",
                path.display()
            )));
        }

        Ok(path)
    }
}

fn resolve_program(program: &str) -> Option<PathBuf> {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.exists().then(|| path.to_path_buf());
    }

    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|candidate| candidate.is_file())
    })
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    true
}

impl Transport for SlaveTransport {
    fn connect(&mut self) -> ClientResult<()> {
        let program = Self::make_command(&self.command)?;
        let display = self.command.join(" ");

        let mut cmd = Command::new(&program);
        cmd.args(&self.command[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        if let Some(env) = &self.env {
            cmd.env_clear().envs(env);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ClientError::protocol(format!("failed to execute {display}: {e}")))?;
        let (hout, hin) = match (child.stdin.take(), child.stdout.take()) {
            (Some(hout), Some(hin)) => (hout, hin),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ClientError::protocol(format!(
                    "failed to attach pipes to {display}"
                )));
            }
        };

        info!("executing {display} as process {}", child.id());
        self.pipes.bind(BufReader::new(hin), hout);
        self.process = Some(child);
        self.check_peer()
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

        if let Some(mut child) = self.process.take() {
            stop_child(&mut child, CLOSE_GRACE);
        }
    }

    fn make_source(&mut self) -> ClientResult<Box<dyn DataSource + '_>> {
        self.pipes.make_source()
    }

    fn make_sink(&mut self) -> ClientResult<Box<dyn DataSink + '_>> {
        self.pipes.make_sink()
    }

    fn check_peer(&mut self) -> ClientResult<()> {
        let Some(child) = self.process.as_mut() else {
            return Ok(());
        };

        match child.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(status)) => Err(ClientError::protocol(format!(
                "slave process is not running! {status}"
            ))),
            Err(e) => Err(ClientError::protocol(format!(
                "failed to poll slave process: {e}"
            ))),
        }
    }
}

/// Waits up to `grace` for `child` to exit on its own, then kills it. Returns
/// whether the child exited without being killed.
fn stop_child(child: &mut Child, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("process {} exited: {status}", child.id());
                return true;
            }
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
            Ok(None) => break,
            Err(e) => {
                debug!("failed to poll process {}: {e}", child.id());
                break;
            }
        }
    }

    debug!("terminating process {}", child.id());
    if let Err(e) = child.kill() {
        debug!("kill failed: {e}");
    }
    if let Err(e) = child.wait() {
        warn!("failed to reap process {}: {e}", child.id());
    }
    false
}

impl Drop for SlaveTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use tempdir::TempDir;

    use super::*;
    use crate::ErrorKind;

    fn command(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn make_command_checks_file() {
        let temp = TempDir::new("slave").unwrap();

        let missing = temp.path().join("graphcore");
        let err = SlaveTransport::make_command(&command(&[missing.to_str().unwrap()])).unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        let plain = temp.path().join("plain");
        fs::write(&plain, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&plain, fs::Permissions::from_mode(0o644)).unwrap();
        let err = SlaveTransport::make_command(&command(&[plain.to_str().unwrap()])).unwrap_err();
        assert!(err.to_string().contains("not executable"));

        let err = SlaveTransport::make_command(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn command_line_is_split_on_whitespace() {
        let mut transport = SlaveTransport::from_command_line("  cat \t -u ");
        assert_eq!(transport.command, command(&["cat", "-u"]));

        transport.connect().unwrap();
        transport.send(b"NONE.\r\n").unwrap();
        assert_eq!(transport.receive().unwrap(), "NONE.\r\n");
    }

    #[test]
    fn stop_child_waits_for_clean_exit() {
        let mut cat = Command::new("cat").stdin(Stdio::piped()).spawn().unwrap();
        drop(cat.stdin.take());
        assert!(stop_child(&mut cat, Duration::from_secs(5)));

        let mut sleeper = Command::new("sleep").arg("30").spawn().unwrap();
        assert!(!stop_child(&mut sleeper, Duration::from_millis(50)));
        assert!(sleeper.try_wait().unwrap().is_some());
    }

    #[test]
    fn make_command_searches_path() {
        let path = SlaveTransport::make_command(&command(&["sh"])).unwrap();
        assert!(path.is_absolute());
    }

    #[test]
    fn echo_through_child() {
        let mut transport = SlaveTransport::new(command(&["cat"]), None, None);
        transport.connect().unwrap();

        transport.send(b"OK. 4\r\n").unwrap();
        assert_eq!(transport.receive().unwrap(), "OK. 4\r\n");
        transport.check_peer().unwrap();

        transport.close();
        transport.close();
        assert!(transport.is_closed());
    }

    #[test]
    fn check_peer_detects_exit() {
        let mut transport = SlaveTransport::new(command(&["sh", "-c", "exit 3"]), None, None);
        // The child may already be gone by the time connect polls it.
        let _ = transport.connect();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match transport.check_peer() {
                Err(err) => {
                    assert_eq!(err.kind(), ErrorKind::Protocol);
                    break;
                }
                Ok(()) if Instant::now() < deadline => thread::sleep(Duration::from_millis(20)),
                Ok(()) => panic!("child exit was not detected"),
            }
        }
    }

    #[test]
    fn working_directory_and_environment() {
        let temp = TempDir::new("slave").unwrap();
        let env = HashMap::from([("GP_TEST".to_string(), "graph".to_string())]);
        let mut transport = SlaveTransport::new(
            command(&["/bin/sh", "-c", "echo \"$GP_TEST $(pwd)\""]),
            Some(temp.path().to_path_buf()),
            Some(env),
        );
        let _ = transport.connect();

        let line = transport.receive().unwrap();
        let expected = fs::canonicalize(temp.path()).unwrap();
        assert_eq!(line.trim(), format!("graph {}", expected.display()));
    }
}
