use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

use gallery::config::Config;
use gallery::server::start_server;

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::args().skip(1).any(|arg| arg == "--print-config") {
        print!("{}", Config::example_config());
        return Ok(());
    }

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("Failed to load config: {:#}, using defaults", e);
            let mut cfg = Config::default();
            cfg.apply_env_overrides(|key| std::env::var(key).ok());
            cfg
        }
    };

    start_server(config).await
}
