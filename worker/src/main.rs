use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Error};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mediaq::config::{self, WorkerConfig};
use mediaq::db::lead_repo;
use mediaq::queue::recover_orphans;
use mediaq::submit::guess_mime;
use mediaq::{
    telemetry, ConverterRegistry, Database, JobQueue, JobSubmitter, PartitionedClaim,
    ProcessRunner, PublicFiles, ResultPropagator, SqliteAttachmentStore, UploadedFile, Worker,
    WorkerOptions,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Media conversion queue worker")]
struct Cli {
    /// JSON config file; MEDIA_* environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process jobs until SIGINT/SIGTERM (default)
    Run,
    /// Submit a local file as an upload for a lead
    Submit {
        #[arg(long)]
        lead: String,
        /// Declared MIME type; guessed from the file name when omitted
        #[arg(long)]
        mime: Option<String>,
        file: PathBuf,
    },
    /// Print job counts per state
    Status,
    /// Move orphaned processing entries back to pending
    Recover {
        /// Treat every processing entry as orphaned regardless of age
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    telemetry::init(config.log_format);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Submit { lead, mime, file } => submit(&config, &lead, mime, &file),
        Command::Status => status(&config),
        Command::Recover { all } => recover(&config, all),
    }
}

fn build_queue(config: &WorkerConfig) -> JobQueue {
    match &config.worker_id {
        Some(worker_id) => JobQueue::with_strategy(
            &config.queue_dir,
            Arc::new(PartitionedClaim::new(worker_id.clone())),
        ),
        None => JobQueue::new(&config.queue_dir),
    }
}

async fn run(config: WorkerConfig) -> Result<(), Error> {
    let db = Database::open(&config.database_path).context("Failed to open database")?;
    let worker = Worker::new(
        build_queue(&config),
        ConverterRegistry::new(config.convert_settings(), Arc::new(ProcessRunner)),
        ResultPropagator::new(Box::new(SqliteAttachmentStore::new(db))),
        WorkerOptions::from_config(&config),
    );

    let token = CancellationToken::new();
    tokio::spawn(shutdown_signal(token.clone()));

    worker.run(token).await?;
    info!("Shutting down");
    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM, only SIGINT stops the worker");
                let _ = tokio::signal::ctrl_c().await;
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received SIGINT");
    }

    token.cancel();
}

fn submit(
    config: &WorkerConfig,
    lead_id: &str,
    mime: Option<String>,
    file: &Path,
) -> Result<(), Error> {
    let original_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("File name is not valid UTF-8")?
        .to_string();
    let mime = mime.unwrap_or_else(|| guess_mime(file));

    // The submitter moves its input, so hand it a copy.
    let incoming = config.temp_dir.join("incoming");
    std::fs::create_dir_all(&incoming)
        .with_context(|| format!("Failed to create {}", incoming.display()))?;
    let temp_path = incoming.join(uuid::Uuid::new_v4().to_string());
    let size = std::fs::copy(file, &temp_path)
        .with_context(|| format!("Failed to copy {}", file.display()))?;

    let submitter = JobSubmitter::new(
        &config.temp_dir,
        build_queue(config),
        PublicFiles::new(&config.output_dir, &config.public_url_prefix),
    );
    let upload = UploadedFile {
        temp_path: temp_path.clone(),
        original_name,
        size,
        mime,
    };
    let attachment = match submitter.submit(lead_id, upload) {
        Ok(attachment) => attachment,
        Err(e) => {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e.into());
        }
    };

    let db = Database::open(&config.database_path).context("Failed to open database")?;
    lead_repo::insert_lead(&db, lead_id)?;
    lead_repo::append_attachment(&db, lead_id, &attachment)?;

    println!("{}", serde_json::to_string_pretty(&attachment)?);
    Ok(())
}

fn status(config: &WorkerConfig) -> Result<(), Error> {
    let counts = build_queue(config).counts()?;
    println!("{}", serde_json::to_string_pretty(&counts)?);
    Ok(())
}

fn recover(config: &WorkerConfig, all: bool) -> Result<(), Error> {
    let stale_after = if all {
        Duration::ZERO
    } else {
        config.orphan_after()
    };
    let report = recover_orphans(&build_queue(config), stale_after, config.max_retries)?;
    println!(
        "requeued: {}, failed: {}, skipped: {}",
        report.requeued, report.failed, report.skipped
    );
    Ok(())
}
