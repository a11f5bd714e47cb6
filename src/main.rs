use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use dataroom::config::{AppConfig, GeneralConfig, RemoteConfig};
use dataroom::error::{self, AppError};
use dataroom::event::{Event, EventHandler};
use dataroom::mutation::{Coordinator, Settled};
use dataroom::remote::{LocalDirRemote, RemoteStore};
use dataroom::session::{Command, Session};
use dataroom::tree::store::TreeStore;

/// Browse and reorganize a data room held in an object store.
#[derive(Parser, Debug)]
#[command(name = "dataroom", version, about)]
struct Cli {
    /// Extra config file, applied over the discovered ones
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding one subdirectory per container
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Container to open
    #[arg(long, global = true)]
    container: Option<String>,

    /// Remote call timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Print rows as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List a folder (the root by default)
    Ls { path: Option<String> },
    /// Search the container by name
    Find { query: String },
    /// Create a folder
    Mkdir { parent: String, name: String },
    /// Delete a file or folder
    Rm { path: String },
    /// Move a file or folder into another folder
    Mv { source: String, dest: String },
    /// Rename a file or folder in place
    Rename { path: String, name: String },
    /// Upload a local file into a folder
    Upload {
        parent: String,
        file: PathBuf,
        /// Name to store it under (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Interactive line-driven session
    Shell,
}

impl Cli {
    fn overrides(&self) -> AppConfig {
        AppConfig {
            general: GeneralConfig {
                container: self.container.clone(),
                ..Default::default()
            },
            remote: RemoteConfig {
                root: self
                    .root
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
                timeout_ms: self.timeout_ms,
            },
            ..Default::default()
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }
}

fn print_rows(session: &Session, json: bool) -> error::Result<()> {
    let rows = session.rows();
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for row in rows {
        let marker = if row.pending { '*' } else { ' ' };
        let name = if row.is_folder() {
            format!("{}/", row.name)
        } else {
            row.name.clone()
        };
        println!(
            "{} {:<40} {:>10}  {:<16} {:<16} {}",
            marker,
            name,
            row.size,
            row.modified,
            row.owner.as_deref().unwrap_or("-"),
            row.tags.join(",")
        );
    }
    Ok(())
}

fn prompt(session: &Session) -> error::Result<()> {
    print!("{}> ", session.location());
    std::io::stdout().flush()?;
    Ok(())
}

async fn shell(mut session: Session, mut events: EventHandler, json: bool) -> error::Result<()> {
    let tx = events.sender();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(Event::Line(line)).is_err() {
                return;
            }
        }
        let _ = tx.send(Event::Line("quit".into()));
    });

    print_rows(&session, json)?;
    prompt(&session)?;

    while let Some(event) = events.next().await {
        session.handle_event(event).await;
        if session.should_quit() {
            break;
        }
        if let Some(note) = session.take_notification() {
            eprintln!("! {}", note);
        }
        print_rows(&session, json)?;
        prompt(&session)?;
    }

    if session.coordinator().in_flight() > 0 {
        session.settle_all(&mut events).await;
        if let Some(note) = session.take_notification() {
            eprintln!("! {}", note);
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> error::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref(), Some(&cli.overrides()));
    init_tracing(&config);

    let remote: Arc<dyn RemoteStore> = Arc::new(LocalDirRemote::new(config.remote_root()));
    let mut events = EventHandler::new();
    let coordinator = Coordinator::new(
        TreeStore::new(config.key_prefix()),
        remote,
        config.container(),
        config.timeout(),
    );
    let mut session = Session::new(coordinator, config.search_scope(), events.sender());
    session.run(Command::Refresh).await?;

    let command = match cli.command.unwrap_or(Commands::Shell) {
        Commands::Shell => return shell(session, events, cli.json).await,
        Commands::Ls { path } => {
            if let Some(path) = path {
                session.run(Command::Cd(path)).await?;
            }
            return print_rows(&session, cli.json);
        }
        Commands::Find { query } => {
            session.run(Command::Find(query)).await?;
            return print_rows(&session, cli.json);
        }
        Commands::Mkdir { parent, name } => {
            Command::Mkdir(format!("{}/{}", parent.trim_end_matches('/'), name))
        }
        Commands::Rm { path } => Command::Rm(path),
        Commands::Mv { source, dest } => Command::Drop {
            source,
            target: dest,
        },
        Commands::Rename { path, name } => Command::Rename { path, name },
        Commands::Upload { parent, file, name } => {
            let name = match name.or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            }) {
                Some(name) => name,
                None => return Err(AppError::InvalidPath(file.display().to_string())),
            };
            let body = tokio::fs::read(&file).await?;
            Command::Upload { parent, name, body }
        }
    };

    session.run(command).await?;
    for outcome in session.settle_all(&mut events).await {
        if let Settled::RolledBack { reason, .. } = outcome {
            return Err(AppError::RemoteRejected(reason));
        }
    }
    print_rows(&session, cli.json)
}
