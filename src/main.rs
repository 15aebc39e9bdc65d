use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    waymirror::logging::init().context("init logging")?;

    let cli = waymirror::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        waymirror::cli::Command::Mirror(args) => {
            waymirror::crawl::run(args).await.context("mirror")?;
        }
        waymirror::cli::Command::CdxImages(args) => {
            waymirror::cdx::images(args).await.context("cdx-images")?;
        }
        waymirror::cli::Command::CdxPages(args) => {
            waymirror::cdx::pages(args).await.context("cdx-pages")?;
        }
    }

    Ok(())
}
