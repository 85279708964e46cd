mod gateway;
mod models;
mod repl;
mod workflow;

use anyhow::Context;
use gateway::{DemoGateway, HttpGateway, MediaGateway};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};
use workflow::WorkflowController;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let demo = std::env::var("DEMO_MODE").map(|v| v == "1").unwrap_or(false);
    let gateway: Arc<dyn MediaGateway> = if demo {
        tracing::info!("demo mode: using placeholder gateway, no network calls");
        Arc::new(DemoGateway)
    } else {
        let base_url =
            std::env::var("API_ROOT").unwrap_or_else(|_| "http://localhost:5000".to_string());
        tracing::info!(%base_url, "using remote media service");
        Arc::new(HttpGateway::new(base_url).context("failed to build http client")?)
    };

    let controller = Arc::new(WorkflowController::new(gateway));

    tokio::select! {
        result = repl::run(controller) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            Ok(())
        }
    }
}
