use anyhow::{bail, Context, Result};
use catalogdrop::common::{EngineConfig, DEFAULT_SERVER_ERROR};
use catalogdrop::progress::{DisplayState, JobId, SessionStatus};
use catalogdrop::session::SessionController;
use catalogdrop::transfer::UploadFile;
use catalogdrop::transport::HttpApi;
use catalogdrop::ui::{self, output, ProgressView};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "catalogdrop")]
#[command(about = "Upload catalog CSVs and follow the import job")]
struct Cli {
    /// Config file (TOML). Defaults to the platform config dir.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Import service base URL, overrides config
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a CSV and follow parse, validate and import progress.
    /// Exits non-zero if the import fails or is cancelled with Ctrl-C.
    Upload {
        #[arg(help = "Path to the CSV file")]
        path: PathBuf,
    },

    /// Show the current state of an import job
    Status {
        #[arg(help = "Job id returned by a previous upload")]
        job_id: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("catalogdrop=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        output::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if let Some(server) = cli.server {
        config.server_url = server;
        config.validate()?;
    }

    match cli.command {
        Commands::Upload { path } => upload(config, path).await,
        Commands::Status { job_id } => status(config, JobId::new(job_id)).await,
    }
}

async fn upload(config: EngineConfig, path: PathBuf) -> Result<()> {
    // fail fast before touching the network
    let file = UploadFile::from_path(&path).await?;

    let api = Arc::new(HttpApi::new(config.clone())?);
    let controller = SessionController::new(api, config.clone());
    let _mount = controller.mount();

    let rx = controller.subscribe();
    controller.start(Some(file.clone()))?;

    let view = ProgressView::new(&file.file_name);
    let last = tokio::select! {
        last = ui::watch_session(rx, config.smoothing_tick(), view) => last,
        _ = tokio::signal::ctrl_c() => {
            let mut last = controller.display();
            controller.cancel();
            last.status = SessionStatus::Cancelled;
            last
        }
    };

    let job = controller
        .job_id()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    let retryable = controller.last_error().is_some_and(|e| e.is_retryable());

    report(&last, &job, retryable)
}

/// Map the final session state to the process outcome; only a completed
/// import is a success.
fn report(last: &DisplayState, job: &str, retryable: bool) -> Result<()> {
    match last.status {
        SessionStatus::Completed => {
            output::success(&format!("Import completed (job {})", job));
            Ok(())
        }
        SessionStatus::Error => {
            if retryable {
                output::warn("Fix the cause and run the upload again to retry.");
            }
            let message = last
                .error_message
                .clone()
                .unwrap_or_else(|| DEFAULT_SERVER_ERROR.to_string());
            bail!("{}", message)
        }
        SessionStatus::Cancelled => {
            bail!("Upload cancelled. The server may still finish the import job.")
        }
        other => bail!("upload ended unexpectedly ({:?})", other),
    }
}

async fn status(config: EngineConfig, job_id: JobId) -> Result<()> {
    let api = HttpApi::new(config)?;

    let spinner = ui::spinner(&format!("Fetching status of {}", job_id));
    let snapshot = match api.job_status(&job_id).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            ui::spinner_error(&spinner, "Status request failed");
            if e.is_retryable() {
                output::warn("The import service may be unreachable; try again shortly.");
            }
            return Err(e).context("could not fetch job status");
        }
    };

    let line = match &snapshot.error {
        Some(err) => format!("{} {}% - {}", snapshot.status, snapshot.progress, err),
        None => format!("{} {}%", snapshot.status, snapshot.progress),
    };
    ui::spinner_success(&spinner, &line);

    if snapshot.phase().is_none() {
        tracing::debug!(status = %snapshot.status, "status label not recognized");
    }
    Ok(())
}
