//! `docsight` -- submit a document for analysis and follow it to the end.
//!
//! Uploads the file, follows the job over the live update channel (falling
//! back to polling when the channel is down), prints a status line on every
//! change and finally the analysis result.
//!
//! # Environment variables
//!
//! See [`TrackerConfig::from_env`]. `--api-url` and `--ws-url` override
//! `DOCSIGHT_API_URL` and `DOCSIGHT_WS_URL`. Logs go to stderr and are
//! filtered with `RUST_LOG` (default `docsight=info`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use docsight_cli::render;
use docsight_tracker::{HttpJobService, JobSession, TrackerConfig, WsConnector};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Submit a document for analysis and follow its progress.
#[derive(Parser, Debug)]
#[command(name = "docsight", version)]
#[command(about = "Submit a PDF, DOCX or TXT document for analysis and follow its progress", long_about = None)]
struct Cli {
    /// Document to analyse
    file: PathBuf,

    /// HTTP base URL of the analysis service (e.g. http://localhost:8000)
    #[arg(long = "api-url")]
    api_url: Option<String>,

    /// WebSocket base URL for live updates (e.g. ws://localhost:8000)
    #[arg(long = "ws-url")]
    ws_url: Option<String>,

    /// Print the final session view as JSON instead of text
    #[arg(long = "json")]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docsight=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = TrackerConfig::from_env();
    if let Some(api_url) = cli.api_url.clone() {
        config.api_url = api_url;
    }
    if let Some(ws_url) = cli.ws_url.clone() {
        config.ws_url = ws_url;
    }

    run(cli, config).await
}

async fn run(cli: Cli, config: TrackerConfig) -> ExitCode {
    let bytes = match tokio::fs::read(&cli.file).await {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Cannot read {}: {e}", cli.file.display());
            return ExitCode::FAILURE;
        }
    };
    let filename = cli
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| cli.file.display().to_string());

    let service = match HttpJobService::new(&config.api_url, config.request_timeout) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };

    match service.health().await {
        Ok(health) => tracing::info!(
            api_url = %config.api_url,
            status = %health.status,
            service = ?health.service,
            "Analysis service reachable",
        ),
        Err(e) => tracing::warn!(
            api_url = %config.api_url,
            error = %e,
            "Health check failed, trying anyway",
        ),
    }

    let connector = Arc::new(WsConnector::new(&config.ws_url));
    let mut session = JobSession::new(service, connector, &config);
    let follower = tokio::spawn(render::follow(session.subscribe()));

    if let Err(e) = session.submit_file(&filename, bytes).await {
        drop(session);
        let _ = follower.await;
        eprintln!("{}", e.user_message());
        return ExitCode::FAILURE;
    }

    let interrupted = tokio::select! {
        _ = session.run_until_settled() => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        tracing::info!(job_id = ?session.job_id(), "Interrupted, cancelling");
        session.reset();
    }

    let view = session.view();
    drop(session);
    let _ = follower.await;

    if cli.json {
        match serde_json::to_string_pretty(&view) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::error!(error = %e, "Failed to encode session view"),
        }
    } else if let Some(result) = view.record.as_ref().and_then(|r| r.result()) {
        println!();
        print!("{}", render::render_result(result));
    }

    ExitCode::from(render::exit_code(&view) as u8)
}
