use anyhow::{Context, Result};
use shapiro_backend::config::ServiceConfig;
use shapiro_backend::runtime::BackendRuntime;
use shapiro_backend::server::serve_backend;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,shapiro_backend=debug")),
        )
        .init();

    let config = ServiceConfig::load();
    let runtime = BackendRuntime::bootstrap(config).context("failed to bootstrap backend runtime")?;

    tracing::info!(
        "Starting Shapiro backend (bind via SHAPIRO_BIND, LLM endpoint via LLM_API_URL)"
    );

    let server_rt = tokio::runtime::Runtime::new().context("failed to start server runtime")?;
    server_rt.block_on(serve_backend(runtime))
}
