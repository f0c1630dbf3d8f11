//! apsim-client
//!
//! Command-line front end for pushing parameter replacements into a running
//! APSIM server and triggering simulation runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use apsim_client::protocol::recv_run;
use apsim_client::transport::SocketListener;
use apsim_client::{ClientConfig, ClientError, Replacement, Session};

#[derive(Parser, Debug)]
#[command(name = "apsim-client")]
#[command(about = "Send parameter replacements to an APSIM simulation server")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a single raw message frame
    Send {
        /// Server identifier (the socket is `CoreFxPipe_<ID>`)
        #[arg(long)]
        id: String,
        message: String,
    },

    /// Read a single raw message frame and print it
    Read {
        #[arg(long)]
        id: String,
    },

    /// Send replacements one by one, without running
    Set {
        #[arg(long)]
        id: String,

        /// Change as PATH=TYPE:VALUE, e.g. `[Wheat].Sow.Population=double:120`
        #[arg(long = "change", required = true)]
        changes: Vec<Replacement>,
    },

    /// Apply changes and run the simulation
    Run {
        #[arg(long)]
        id: String,

        /// Change as PATH=TYPE:VALUE (repeatable, applied in order)
        #[arg(long = "change")]
        changes: Vec<Replacement>,

        /// JSON file holding an array of replacements, applied before `--change`
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Act as a server: accept one client and print received runs as JSON lines
    Listen {
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::from_env().context("Failed to load configuration")?;

    match args.command {
        Command::Send { id, message } => {
            let session = connect(&id, &config).await?;
            session
                .send_raw(message.as_bytes())
                .await
                .context("Failed to send message")?;
            session.disconnect().await?;
        }
        Command::Read { id } => {
            let session = connect(&id, &config).await?;
            let frame = session.read_raw().await.context("Failed to read message")?;
            println!("{}", String::from_utf8_lossy(&frame));
            session.disconnect().await?;
        }
        Command::Set { id, changes } => {
            let session = connect(&id, &config).await?;
            for change in &changes {
                session
                    .send_replacement(change)
                    .await
                    .with_context(|| format!("Failed to send replacement {change}"))?;
                info!(change = %change, "Replacement sent");
            }
            session.disconnect().await?;
        }
        Command::Run { id, changes, file } => {
            let mut all_changes = match file {
                Some(path) => load_changes(&path)?,
                None => Vec::new(),
            };
            all_changes.extend(changes);

            let session = connect(&id, &config).await?;
            session
                .run_with_changes(&all_changes)
                .await
                .context("Run failed; server parameters are now undefined")?;
            info!(changes = all_changes.len(), "Simulation run finished");
            session.disconnect().await?;
        }
        Command::Listen { id } => listen(&id, &config).await?,
    }

    Ok(())
}

async fn connect(id: &str, config: &ClientConfig) -> Result<Session> {
    Session::connect(id, config)
        .await
        .with_context(|| format!("Failed to connect to simulation server '{id}'"))
}

fn load_changes(path: &Path) -> Result<Vec<Replacement>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn listen(id: &str, config: &ClientConfig) -> Result<()> {
    let listener = SocketListener::bind(&config.socket_path(id), config)
        .context("Failed to bind server socket")?;
    let mut transport = listener.accept().await.context("Failed to accept client")?;

    loop {
        match recv_run(&mut transport).await {
            Ok(changes) => {
                info!(changes = changes.len(), "Run received");
                for change in &changes {
                    println!("{}", serde_json::to_string(change)?);
                }
            }
            Err(ClientError::ConnectionClosed) => {
                info!("Client disconnected");
                return Ok(());
            }
            Err(e) => return Err(e).context("Run transaction failed"),
        }
    }
}
