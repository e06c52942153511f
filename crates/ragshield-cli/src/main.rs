//! ragshield Command-Line Client
//!
//! Inspect the backend capability table and compile retrieval requests into
//! native vector-store filters.

mod commands;
mod formatter;

use clap::{Parser, Subcommand};
use formatter::OutputFormat;
use std::path::PathBuf;

/// ragshield Command-Line Client
#[derive(Parser, Debug)]
#[command(name = "ragshield")]
#[command(version, about = "Compile RAG access-control constraints into vector-store filters")]
pub struct Args {
    /// Output format
    #[arg(long, global = true, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Enforcement configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List supported backends and their filter capabilities
    Backends,

    /// Compile a retrieval request into a backend's native filter
    Compile {
        /// Backend or store type identifier (e.g. qdrant, PineconeVectorStore)
        #[arg(short, long)]
        backend: String,

        /// Retrieval request file (JSON)
        #[arg(short, long)]
        request: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ragshield=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let formatter = formatter::create_formatter(args.format);

    let result = match &args.command {
        Command::Backends => commands::backends(args.config.as_deref(), &*formatter),
        Command::Compile { backend, request } => {
            commands::compile(backend, request, args.config.as_deref(), &*formatter)
        }
    };

    match result {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}", formatter.format_error(&e.to_string()));
            std::process::exit(1);
        }
    }
}
