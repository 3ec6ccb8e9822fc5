use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bazaar_search::config;
use bazaar_search::download::{DownloadOutcome, DownloadRequest, ProgressCallback};
use bazaar_search::messages::{Severity, UserMessage};
use bazaar_search::search::{SearchEvent, SearchOutcome};

/// MalwareBazaar search client.
#[derive(Parser, Debug)]
#[command(name = "bazaar-search", version, about = "Search and download MalwareBazaar samples")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a search query, e.g. `tag:"emotet" file_type:"exe" limit:50`.
    Search {
        /// Whitespace separated `key:value` filters.
        query: String,
    },
    /// Download one sample archive by SHA256.
    Download {
        sha256: String,
        /// Override the configured download directory.
        #[arg(short, long)]
        dir: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bazaar_search=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(
        "bazaar-search {} ({} build, {})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_PROFILE"),
        env!("BUILD_TIME")
    );

    // Load configuration / 加载配置
    config::init_config().map_err(anyhow::Error::msg)?;
    let app_config = config::config();
    tracing::debug!("Using endpoint {}", app_config.api.endpoint);

    let transport = bazaar_search::build_transport(&app_config)?;

    // Ctrl-C cancels whatever is running / Ctrl-C 取消当前操作
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Search { query } => {
            let coordinator = bazaar_search::build_coordinator(&app_config, transport);
            let batch = match app_config.query_parser().parse(&query) {
                Ok(batch) => batch,
                Err(e) => {
                    let error = bazaar_search::error::SearchError::from(e);
                    print_message(&error.code().render(&error.format_args()));
                    std::process::exit(2);
                }
            };

            let mut handle = coordinator.start(batch);
            let bar = spinner(handle.take_events());
            let search_cancel = handle.cancel_token();
            let forward = cancel.clone();
            tokio::spawn(async move {
                forward.cancelled().await;
                search_cancel.cancel();
            });

            let outcome = handle.outcome().await;
            bar.finish_and_clear();
            std::process::exit(report_search(outcome));
        }
        Commands::Download { sha256, dir } => {
            let mut download_config = app_config.clone();
            if let Some(dir) = dir {
                download_config.download.dir = dir;
            }
            let downloader = bazaar_search::build_downloader(&download_config, transport);

            let bar = ProgressBar::new(100);
            bar.set_style(
                ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            let progress_bar = bar.clone();
            let progress: ProgressCallback = Arc::new(move |percent| progress_bar.set_position(percent as u64));

            let result = downloader
                .download(&DownloadRequest::new(sha256), Some(progress), &cancel)
                .await;
            bar.finish_and_clear();

            match result {
                Ok(DownloadOutcome::Saved(path)) => {
                    println!("{} {}", style("Saved").green(), path.display());
                }
                Ok(DownloadOutcome::Cancelled) => {
                    println!("{}", style("Download cancelled").yellow());
                    std::process::exit(130);
                }
                Err(e) => {
                    tracing::debug!("download failed: {}", e);
                    print_message(&e.code().render(&e.format_args()));
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// Spinner fed by search progress events / 由搜索进度事件驱动的指示器
fn spinner(events: Option<broadcast::Receiver<SearchEvent>>) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.enable_steady_tick(Duration::from_millis(120));
    bar.set_message("Searching...");

    if let Some(mut events) = events {
        let bar = bar.clone();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if let SearchEvent::Progress { completed, total, .. } = event {
                    bar.set_message(format!("Searching... {}/{}", completed, total));
                }
                if event.is_terminal() {
                    break;
                }
            }
        });
    }
    bar
}

/// Print the outcome, returning the exit code / 打印结果并返回退出码
fn report_search(outcome: SearchOutcome) -> i32 {
    match outcome {
        SearchOutcome::Completed(result) => {
            if let Some(code) = result.empty_reason() {
                print_message(&code.render(&[]));
                return 0;
            }
            for record in result.display_records() {
                println!(
                    "{}  {}  {}  {}",
                    style(&record.sha256_hash).dim(),
                    style(&record.file_name).bold(),
                    record.file_type,
                    record.size,
                );
                println!(
                    "    signature: {}  first seen: {}  downloads: {}  uploads: {}",
                    record.signature, record.first_seen, record.downloads, record.uploads,
                );
                if !record.tags.is_empty() {
                    println!("    tags: {}", style(&record.tags).cyan());
                }
            }
            println!("{} {} sample(s)", style("Found").green(), result.len());
            0
        }
        SearchOutcome::Failed(error) => {
            tracing::debug!("search failed: {}", error);
            print_message(&error.code().render(&error.format_args()));
            1
        }
        SearchOutcome::Cancelled => {
            println!("{}", style("Search cancelled").yellow());
            130
        }
    }
}

fn print_message(message: &UserMessage) {
    let title = match message.severity {
        Severity::Information => style(message.title.as_str()).cyan(),
        Severity::Warning => style(message.title.as_str()).yellow(),
        Severity::Critical => style(message.title.as_str()).red(),
    };
    eprintln!("{} {}", title.bold(), message.message);
}
