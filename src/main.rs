use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use zedis::config::{Config, tracing_directive};
use zedis::engine::Engine;
use zedis::server;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::from_args(&args);

    // RUST_LOG wins over --loglevel when both are given.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing_directive(&config.loglevel).unwrap_or("info")));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    server::run_server(Arc::new(Engine::new(config))).await
}
