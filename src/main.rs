//! # Coach RAG CLI (`ragctl`)
//!
//! Operator interface for the coach knowledge-base ingestion pipeline:
//! database setup, file and YouTube ingestion, inspection, and the HTTP
//! server.
//!
//! ## Usage
//!
//! ```bash
//! ragctl --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragctl init` | Create the SQLite database and schema |
//! | `ragctl upload <paths>... --coach id:tier` | Ingest files or directories |
//! | `ragctl youtube --url <url> --coach id:tier` | Ingest a video or playlist |
//! | `ragctl status <video>` | Show whether a video is already ingested |
//! | `ragctl get <id>` | Print a source with its chunks and grants |
//! | `ragctl deactivate <id>` | Soft-delete every chunk of a source |
//! | `ragctl stats` | Database overview |
//! | `ragctl serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! ragctl init
//! ragctl upload ./handouts --coach carnivore:pro --coach keto:free
//! ragctl youtube --url "https://www.youtube.com/playlist?list=PL123" --coach keto:premium
//! ragctl serve
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use coach_rag::config;
use coach_rag::progress::ProgressMode;
use coach_rag::youtube_ingest::YoutubeRequest;
use coach_rag::{get, ingest, migrate, server, stats, youtube_ingest};
use coach_rag_core::models::{CoachAccess, SourceType};

/// Coach RAG: ingest documents and video transcripts into a per-coach
/// retrieval knowledge base.
#[derive(Parser)]
#[command(
    name = "ragctl",
    about = "Coach RAG: ingestion pipeline for per-coach knowledge bases",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Ingest local files.
    ///
    /// Directories are walked recursively and filtered through the
    /// `[upload]` include/exclude globs.
    Upload {
        /// Files or directories to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Coach access as `<coachId>:<tier>` (tier: free, premium, pro). Repeatable.
        #[arg(long = "coach", required = true)]
        coaches: Vec<CoachAccess>,

        /// Title override (single file only).
        #[arg(long)]
        title: Option<String>,

        /// Source type recorded on the source (`document` or `url`).
        #[arg(long, default_value = "document")]
        source_type: SourceType,

        /// Progress on stderr. Defaults to `human` on a TTY, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Ingest a YouTube video or playlist.
    Youtube {
        /// Video or playlist URL.
        #[arg(long)]
        url: Option<String>,

        /// 11-character video id.
        #[arg(long)]
        video_id: Option<String>,

        /// Playlist id.
        #[arg(long)]
        playlist_id: Option<String>,

        /// Coach access as `<coachId>:<tier>`. Repeatable.
        #[arg(long = "coach", required = true)]
        coaches: Vec<CoachAccess>,
    },

    /// Show whether a video (id or URL) has already been ingested.
    Status {
        video: String,
    },

    /// Retrieve a content source by id.
    Get {
        id: String,
    },

    /// Deactivate every chunk of a source so it can be ingested again.
    Deactivate {
        id: String,
    },

    /// Show database statistics.
    Stats,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Print shell completions to stdout.
    Completions {
        shell: Shell,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "ragctl", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Upload {
            paths,
            coaches,
            title,
            source_type,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_upload(&cfg, &paths, &coaches, title, source_type, progress).await?;
        }
        Commands::Youtube {
            url,
            video_id,
            playlist_id,
            coaches,
        } => {
            let request = YoutubeRequest {
                playlist_id,
                video_id,
                url,
            };
            youtube_ingest::run_youtube(&cfg, &request, &coaches).await?;
        }
        Commands::Status { video } => {
            youtube_ingest::run_video_status(&cfg, &video).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Deactivate { id } => {
            get::run_deactivate(&cfg, &id).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
