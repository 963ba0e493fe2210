mod api;
mod config;
mod metrics_defs;
mod service;

use analysis::ChatCompletionClient;
use clap::Parser;
use config::Config;
use service::{AppService, AppState};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "feedback-analyzer")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short, default_value = "config.yaml")]
    config: std::path::PathBuf,
}

fn install_statsd(config: &config::MetricsConfig) -> Result<(), Box<dyn std::error::Error>> {
    let recorder =
        metrics_exporter_statsd::StatsdBuilder::from(&config.statsd_host, config.statsd_port)
            .build(Some("feedback_analyzer"))
            .map_err(|e| format!("statsd exporter: {e}"))?;
    metrics::set_global_recorder(recorder).map_err(|e| format!("metrics recorder: {e}"))?;

    for def in metrics_defs::ALL_METRICS {
        tracing::debug!(
            name = def.name,
            kind = def.metric_type.as_str(),
            "registered metric"
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;

    if let Some(metrics_config) = &config.metrics {
        install_statsd(metrics_config)?;
    }

    let classifier = Arc::new(ChatCompletionClient::new(config.classifier.clone()));
    let state = Arc::new(AppState::new(
        config.warehouse.clone(),
        classifier,
        config.app.clone(),
    ));

    tracing::info!(
        host = %config.listener.host,
        port = config.listener.port,
        reference = %config.app.consumer_reference,
        "starting feedback-analyzer"
    );

    shared::http::run_http_service(
        &config.listener.host,
        config.listener.port,
        AppService::new(state),
    )
    .await?;

    Ok(())
}
