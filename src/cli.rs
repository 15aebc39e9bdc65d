use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Rebuild a browsable local mirror from Wayback snapshot links.
    Mirror(MirrorArgs),
    /// Bulk-download every archived image of a site via the CDX catalog.
    CdxImages(CdxArgs),
    /// Bulk-download every archived HTML page of a site via the CDX catalog.
    CdxPages(CdxArgs),
}

/// Treatment of anchor links leaving the mirrored site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExternalPolicy {
    /// Point at the original live URL.
    Original,
    /// Keep the archived form as written.
    Archive,
    /// Leave the attribute untouched.
    Delete,
}

#[derive(Debug, Args)]
pub struct MirrorArgs {
    /// Wayback snapshot link (repeatable; tried in the given order, all for
    /// the same site).
    #[arg(long = "snapshot", required = true)]
    pub snapshots: Vec<String>,

    /// Output directory for the mirrored site.
    #[arg(long)]
    pub out: String,

    /// Follow same-site links beyond the entry page.
    #[arg(long)]
    pub recursive: bool,

    /// What to do with anchor links that leave the mirrored site.
    #[arg(long, value_enum, default_value = "original")]
    pub external: ExternalPolicy,
}

#[derive(Debug, Args)]
pub struct CdxArgs {
    /// Site host to enumerate in the archive catalog.
    #[arg(long)]
    pub domain: String,

    /// Archive timestamp the catalog query is pinned to.
    #[arg(long)]
    pub timestamp: String,

    /// Output directory for the fetched files.
    #[arg(long)]
    pub out: String,
}
