use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use stratus::config::StratusConfig;
use stratus::dump::instance_to_dump;
use stratus::form::FormNode;
use stratus::{CommandFetcher, EditOutcome, FilePublisher, Workspace};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "stratus", about = "Compose protobuf messages from .proto schemas")]
struct Cli {
    /// Config file (TOML); defaults apply when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List sub-directories and .proto files
    Ls {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Open a schema and list the messages it declares
    Messages { file: PathBuf },
    /// Print the editable field tree of a message
    Fields { file: PathBuf, message: String },
    /// Fill in a message and encode it
    Compose {
        file: PathBuf,
        message: String,
        /// Append one item to a repeated field (applied before --set)
        #[arg(long = "append", value_name = "PATH")]
        appends: Vec<String>,
        /// Assign PATH=VALUE
        #[arg(long = "set", value_name = "PATH=VALUE")]
        sets: Vec<String>,
        /// Event type handed to the publisher
        #[arg(long)]
        event_type: Option<String>,
        /// Write the encoded bytes here instead of printing hex
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_env("STRATUS_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = StratusConfig::load(cli.config.as_deref())?;
    let fetcher = Arc::new(CommandFetcher::from_config(&config.fetch));

    match cli.command {
        Command::Ls { dir } => {
            let ws = Workspace::new(config, fetcher, dir)?;
            for entry in ws.entries().context("listing directory")? {
                println!("{}", entry.name());
            }
        }
        Command::Messages { file } => {
            let mut ws = Workspace::new(config, fetcher, ".")?;
            let schema = ws.open(path_str(&file)?).await?;
            for (module, error) in schema.report().failures() {
                eprintln!("warning: {}: {}", module, error);
            }
            for name in schema.message_names() {
                println!("{}", name);
            }
        }
        Command::Fields { file, message } => {
            let mut ws = Workspace::new(config, fetcher, ".")?;
            ws.open(path_str(&file)?).await?;
            let session = ws.select(&message)?;
            print_nodes(session.tree().nodes(), 0);
        }
        Command::Compose {
            file,
            message,
            appends,
            sets,
            event_type,
            out,
        } => {
            let mut ws = Workspace::new(config, fetcher, ".")?;
            ws.open(path_str(&file)?).await?;
            let session = ws.select(&message)?;
            if let Some(event_type) = event_type {
                session.set_event_type(event_type);
            }
            for path in &appends {
                let item = session.append(path)?;
                tracing::debug!(item = %item, "appended");
            }
            for assignment in &sets {
                let Some((path, text)) = assignment.split_once('=') else {
                    bail!("expected PATH=VALUE, got {:?}", assignment);
                };
                if let EditOutcome::Reset { value, reason } = session.edit(path, text)? {
                    eprintln!("warning: {}: {} (reset to {})", path, reason, value);
                }
            }

            let finalized = match out {
                Some(out) => session.submit(&FilePublisher::new(out))?,
                None => {
                    let finalized = session.finalize()?;
                    println!("{}", hex(finalized.bytes()));
                    finalized
                }
            };
            eprintln!("{}", instance_to_dump(session.registry(), finalized.instance(), 0));
        }
    }
    Ok(())
}

fn print_nodes(nodes: &[FormNode], depth: usize) {
    for node in nodes {
        let marker = if node.is_collapsed() { " ..." } else { "" };
        println!("{}{}{}", "  ".repeat(depth), node.info().label, marker);
        print_nodes(node.children(), depth + 1);
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("path is not valid UTF-8: {}", path.display()))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
