use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "gateway-cli",
    about = "Drive an offline gateway against a live origin",
    version,
    author
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Origin every request is resolved against
    #[arg(long, global = true, env = "GATEWAY_ORIGIN", default_value = "http://localhost:3000")]
    pub origin: String,

    /// Cache generation of the current build
    #[arg(short, long, global = true, default_value = "v1")]
    pub generation: String,

    /// Persistent store directory; memory only when omitted
    #[arg(short, long, global = true, env = "GATEWAY_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value = "30", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Path of the asset manifest endpoint
    #[arg(long, global = true, default_value = "/assets-manifest")]
    pub manifest_path: String,

    /// Path of the offline fallback document
    #[arg(long, global = true, default_value = "/offline")]
    pub fallback_path: String,

    /// Additional never-cache path pattern (repeatable)
    #[arg(long = "exclude", global = true)]
    pub excluded_patterns: Vec<String>,

    /// Custom request header as `Name: value` (repeatable)
    #[arg(short = 'H', long = "header", global = true)]
    pub headers: Vec<String>,

    /// Do not retry cache-first misses without the query string
    #[arg(long, global = true)]
    pub strict_query: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install the current generation: sync the manifest and pre-populate the store
    Install,

    /// Install and activate, then fetch a URL through the gateway
    Fetch {
        /// URL or origin-relative path to fetch
        url: String,

        /// Treat the request as a full-document navigation
        #[arg(short, long)]
        navigate: bool,

        /// Write the response body to a file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fetch the asset manifest and print its assets
    Sync,

    /// List the generations held by the store
    Generations,

    /// Delete every generation except the current one
    Collect,
}
