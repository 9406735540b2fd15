// CLI argument definitions using clap

use clap::{ArgGroup, Parser};

#[derive(Parser, Debug)]
#[command(name = "blobsync")]
#[command(author = "hatlonely <hatlonely@foxmail.com>")]
#[command(version = "0.1.0")]
#[command(about = "Replicate an object storage container with server-side copies", long_about = None)]
#[command(group(ArgGroup::new("job_source").required(true).args(["job", "job_json"])))]
pub struct Cli {
    /// Path to config file (default: ~/.blobsync/config.yaml)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Path to a JSON job message
    #[arg(short, long)]
    pub job: Option<String>,

    /// Inline JSON job message
    #[arg(long)]
    pub job_json: Option<String>,

    /// Resume from a checkpoint file written by a previous run
    #[arg(long)]
    pub resume: Option<String>,

    /// Override replication.max_concurrency
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Show progress bar
    #[arg(long)]
    pub progress: bool,
}
