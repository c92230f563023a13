use std::path::PathBuf;

use loomwright_agent::{config, supervisor};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("loomwright agent starting");

    let config_dir = std::env::var("LOOM_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"));

    let agent_config = match config::load_config(&config_dir) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration — refusing to start");
            std::process::exit(1);
        }
    };

    if let Err(e) = supervisor::run(agent_config).await {
        tracing::error!(error = %e, "agent supervisor exited with error");
        std::process::exit(1);
    }
}
