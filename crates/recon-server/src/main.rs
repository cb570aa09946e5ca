//! recon-server binary

use std::net::SocketAddr;

use clap::Parser;
use recon_core::PREVIEW_ROWS;
use recon_server::{router, AppState, ServerConfig};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "recon-server")]
#[command(about = "Local HTTP control plane for the record reconciler", long_about = None)]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:5000")]
    bind: SocketAddr,

    /// Preview rows returned by /upload, capped at the loaded preview size
    #[arg(long, default_value_t = PREVIEW_ROWS)]
    preview_rows: usize,

    /// Largest accepted upload, in megabytes
    #[arg(long, default_value_t = 512)]
    max_upload_mb: usize,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.log_json);

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> std::io::Result<()> {
    let config = ServerConfig {
        preview_rows: args.preview_rows,
        max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
    };
    let app = router(AppState::new(config));

    let listener = TcpListener::bind(args.bind).await?;
    info!(addr = %args.bind, "recon-server listening");
    axum::serve(listener, app).await
}
