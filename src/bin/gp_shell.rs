use std::{
    error::Error,
    io,
    path::PathBuf,
    process,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use clap::{Parser, Subcommand};
use gpclient::{
    Connection, ConnectionConfig, DEFAULT_PORT,
    cli::shell,
    transport::{ClientTransport, SlaveTransport, Transport},
};
use log::info;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Allow `<` and `>` redirection on the peer's side
    #[arg(long)]
    allow_pipes: bool,
    /// Accept any non-operator characters in arguments
    #[arg(long)]
    lenient: bool,
    /// Read timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
    #[command(subcommand)]
    peer: Peer,
}

#[derive(Debug, Subcommand)]
enum Peer {
    /// Connect to a graph server
    Tcp {
        #[arg(long, default_value = "localhost")]
        host: String,
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Graph to use after connecting
        #[arg(long)]
        graph: Option<String>,
    },
    /// Run a graph processor as a child process
    Slave {
        /// Working directory of the child
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Program and arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let config = ConnectionConfig::default()
        .allow_pipes(cli.allow_pipes)
        .strict_arguments(!cli.lenient)
        .read_timeout(cli.timeout.map(Duration::from_secs));

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            process::exit(130);
        }
        eprintln!("\ninterrupted, closing connection (press Ctrl-C again to abort)");
    })?;

    match cli.peer {
        Peer::Tcp { host, port, graph } => {
            let mut conn = Connection::new(ClientTransport::new(host, port), config);
            if let Some(graph) = graph {
                conn = conn.with_graph(graph);
            }
            run(conn, &interrupted)
        }
        Peer::Slave { cwd, command } => {
            let conn = Connection::new(SlaveTransport::new(command, cwd, None), config);
            run(conn, &interrupted)
        }
    }
}

fn run<T: Transport>(mut conn: Connection<T>, interrupted: &AtomicBool) -> Result<(), Box<dyn Error>> {
    if let Err(e) = conn.connect() {
        conn.close();
        return Err(e.into());
    }
    info!("protocol version {}", conn.protocol_version()?);

    shell(&mut conn, io::stdin().lock(), io::stdout().lock(), io::stderr(), interrupted)?;
    Ok(())
}
