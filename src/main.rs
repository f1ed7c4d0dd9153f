//! # slackport CLI
//!
//! Parses a Slack export, downloads attached files, and posts everything
//! to Discord.

use std::process;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use slackport::cli::Args;
use slackport::config::ImportConfig;
use slackport::discord::{ChannelResolver, DeliveryPipeline, RestGateway, RetryPolicy};
use slackport::download::FileFetcher;
use slackport::error::Result;
use slackport::ingest::ExportIngester;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args).await {
        error!(error = %e, "import failed");
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "slackport=debug,info"
    } else {
        "slackport=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<()> {
    let config = ImportConfig::from_args(args)?;

    // parse either a single file (one day of one Slack channel), one
    // channel dir, or the whole export tree
    let ingester = ExportIngester::new(config.source.clone(), config.users_file.clone());
    let mut export = ingester.ingest()?;

    // files must be local before delivery starts; attach calls need paths
    let fetcher = FileFetcher::new(config.downloads_dir.clone(), config.ignore_file_not_found)?;
    fetcher.fetch_all(&mut export).await?;

    // Ctrl-C trips the cancel token; it is observed during retry waits
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, stopping at the next retry wait");
                cancel.cancel();
            }
        });
    }

    let gateway = Arc::new(RestGateway::new(config.token.clone())?);
    let resolver = ChannelResolver::new(
        config.server_name.clone(),
        config.create_channels,
        config.dry_run,
    );
    let retry = RetryPolicy::new(cancel);
    let mut pipeline = DeliveryPipeline::new(gateway, resolver, retry, config.dry_run);

    let report = pipeline.run(Arc::new(export)).await?;

    if report.failed {
        warn!("posting was interrupted or caught an error; see the log above");
    }
    info!(
        messages = report.messages_posted,
        threads = report.threads_created,
        files = report.files_attached,
        "Discord import from Slack export complete"
    );
    Ok(())
}
