//! # studydeck CLI (`deck`)
//!
//! ## Usage
//!
//! ```bash
//! deck --config ./config/deck.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `deck init` | Create the SQLite database and run schema migrations |
//! | `deck ingest <file>` | Run the ingestion pipeline for one job |
//! | `deck segment <file>` | Print the sections a file would produce |
//! | `deck show <id>` | Show a document, its current version and sections |
//! | `deck chat <id> "<question>"` | Ask a question about a processed document |
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); stdout carries only
//! command output.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use studydeck::ingest_cmd::IngestArgs;
use studydeck::progress::ProgressMode;
use studydeck::{chat, config, db, ingest_cmd, migrate, show};

/// studydeck CLI: ingest study material into titled, size-bounded sections.
#[derive(Parser)]
#[command(
    name = "deck",
    about = "studydeck: document ingestion and segmentation for a study assistant",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/deck.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the documents, document_versions,
    /// document_sections and flashcards tables. Idempotent.
    Init,

    /// Ingest one document.
    ///
    /// Acquires the text, segments it, stores a new version with its
    /// sections, and marks the document ready.
    Ingest {
        /// Local file to ingest (PDF or text).
        file: Option<PathBuf>,

        /// Inline text instead of a file.
        #[arg(long)]
        text: Option<String>,

        /// Blob-store bucket (with --path).
        #[arg(long)]
        bucket: Option<String>,

        /// Object path within --bucket.
        #[arg(long)]
        path: Option<String>,

        /// JSON job payload as produced by the worker queue.
        #[arg(long)]
        job: Option<PathBuf>,

        /// Document id. A new UUID when omitted.
        #[arg(long)]
        document_id: Option<String>,

        #[arg(long, default_value = "local")]
        user_id: String,

        /// Title; defaults to the file stem.
        #[arg(long)]
        title: Option<String>,

        /// Address to notify when the deck is ready.
        #[arg(long)]
        email: Option<String>,
    },

    /// Segment a file without persisting anything.
    Segment {
        file: PathBuf,

        /// Fallback title for text before the first heading.
        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Show a document with its current version and sections.
    Show {
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Ask a question about a processed document.
    Chat {
        document_id: String,
        question: String,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;
    let progress = cli
        .progress
        .map(ProgressMode::from)
        .unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            file,
            text,
            bucket,
            path,
            job,
            document_id,
            user_id,
            title,
            email,
        } => {
            let args = IngestArgs {
                file,
                text,
                bucket,
                path,
                job,
                document_id,
                user_id,
                title,
                email,
            };
            ingest_cmd::run_ingest(&cfg, &args, progress).await?;
        }
        Commands::Segment { file, title, json } => {
            ingest_cmd::run_segment(&cfg, &file, title.as_deref(), json)?;
        }
        Commands::Show { id, json } => {
            show::run_show(&cfg, &id, json).await?;
        }
        Commands::Chat {
            document_id,
            question,
        } => {
            chat::run_chat(&cfg, &document_id, &question).await?;
        }
    }

    Ok(())
}
