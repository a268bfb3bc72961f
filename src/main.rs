use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser as _;

use serialarchive::archive::Archiver;
use serialarchive::cli::{ArchiveArgs, Cli, Command};
use serialarchive::extract::HtmlExtractor;
use serialarchive::probe::FfprobeProber;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    serialarchive::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Discover(args) => {
            let archiver = archiver(args)?;
            let items = archiver.ensure_index().await.context("discover")?;
            println!("{} items indexed in {}", items.len(), archiver.store().path().display());
        }
        Command::Archive(args) => {
            let summary = archiver(args)?.run().await.context("archive")?;
            println!(
                "{} items archived ({} complete, {} incomplete)",
                summary.items, summary.complete, summary.incomplete
            );
        }
        Command::CacheKey(args) => {
            println!("{}", serialarchive::cache::cache_key(&args.url));
        }
    }

    Ok(())
}

fn archiver(args: ArchiveArgs) -> anyhow::Result<Archiver> {
    let config = args.into_config()?;
    let prober = Arc::new(FfprobeProber::new(config.ffprobe_bin.clone()));
    Archiver::new(config, Arc::new(HtmlExtractor), prober)
}
