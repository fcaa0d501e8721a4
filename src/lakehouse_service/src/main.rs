use clap::Parser;
use lakehouse_service::{run_until_shutdown, logging, Result, ServiceConfig};

#[derive(Parser)]
#[command(name = "lakehouse-service")]
#[command(about = "Metadata control plane for the Iceberg-compatible data lake")]
struct Cli {
    /// Base path for the data-lake's on-disk layout
    base_path: String,

    /// Astha dispatcher poll interval, in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_interval_ms: u64,

    /// Change-log rows read per dispatcher poll
    #[arg(long, default_value_t = 10)]
    poll_batch_size: i64,

    /// Worker pool size (defaults to available parallelism)
    #[arg(long)]
    worker_count: Option<usize>,

    /// Batch planner: max files per batch
    #[arg(long, default_value_t = 10)]
    max_files_per_batch: usize,

    /// Batch planner: min bytes before closing a batch early
    #[arg(long, default_value_t = 100 * 1024 * 1024)]
    min_batch_size_bytes: i64,

    /// Batch planner: max bytes per batch
    #[arg(long, default_value_t = 1024 * 1024 * 1024)]
    max_batch_size_bytes: i64,
}

#[tokio::main]
pub async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let config = ServiceConfig {
        base_path: cli.base_path.into(),
        poll_interval_ms: cli.poll_interval_ms,
        poll_batch_size: cli.poll_batch_size,
        worker_count: cli.worker_count,
        max_files_per_batch: cli.max_files_per_batch,
        min_batch_size_bytes: cli.min_batch_size_bytes,
        max_batch_size_bytes: cli.max_batch_size_bytes,
    };

    run_until_shutdown(config).await
}
