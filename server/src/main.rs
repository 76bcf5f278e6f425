use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use mmdb_core::EngineConfig;
use mmdb_server::build_app;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Directory holding the CSV corpora
    #[arg(long, default_value = "./data")]
    data_dir: String,
    /// Optional JSON file with engine settings
    #[arg(long)]
    config: Option<PathBuf>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8000)]
    port: u16,
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(p) => {
            let text = std::fs::read_to_string(p).with_context(|| format!("reading config {}", p.display()))?;
            Ok(serde_json::from_str(&text)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    let app: Router = build_app(args.data_dir.clone(), config)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, data_dir = %args.data_dir, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
