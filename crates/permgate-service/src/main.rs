//! permgated
//!
//! Loads configuration, provisions the rights topic, then serves the
//! mutation API until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use permgate_authorization::{AdminCheck, AllowAll, AuthorizationGate, HttpAdminCheck};
use permgate_log::{
    ClusterAdmin, EventPublisher, LogWriter, ProvisionedTopic, TopicProvisioner, TopicSpec,
};
use permgate_service::{AuthorizationConfig, Config, LogConfig, MutationService};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "permgated")]
#[command(about = "Authorization-checked gateway for rights changes", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, env = "PERMGATE_CONFIG", default_value = "permgate.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let gate = AuthorizationGate::new(admin_check(&config.authorization)?);

    let topic = TopicProvisioner::new(cluster_admin(&config.log)?)
        .ensure_topic(&TopicSpec::compacted(&config.log.topic))
        .await
        .context("provisioning rights topic")?;

    let publisher = EventPublisher::new(topic.clone(), log_writer(&topic, &config.log)?)
        .with_max_attempts(config.log.publish_attempts);
    let service = Arc::new(MutationService::new(gate, publisher));

    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, topic = topic.name(), "permgated listening");

    permgate_service::serve(listener, service.clone(), shutdown_signal()).await?;

    if let Err(err) = service.publisher().flush(Duration::from_secs(10)).await {
        error!(error = %err, "flush at shutdown failed");
    }
    info!("permgated stopped");
    Ok(())
}

fn admin_check(config: &AuthorizationConfig) -> Result<Arc<dyn AdminCheck>> {
    match config {
        AuthorizationConfig::Remote {
            check_url,
            timeout_ms,
        } => {
            let check = HttpAdminCheck::with_timeout(check_url, Duration::from_millis(*timeout_ms))?;
            info!(%check_url, "admin checks delegated to authorization service");
            Ok(Arc::new(check))
        }
        AuthorizationConfig::AllowAll => {
            warn!("authorization mode is allow-all: every admin check is granted");
            Ok(Arc::new(AllowAll))
        }
    }
}

#[cfg(feature = "kafka")]
fn cluster_admin(config: &LogConfig) -> Result<Arc<dyn ClusterAdmin>> {
    let admin = permgate_log::kafka::KafkaCluster::connect(&config.cluster, config.request_timeout())?;
    Ok(Arc::new(admin))
}

#[cfg(feature = "kafka")]
fn log_writer(topic: &ProvisionedTopic, config: &LogConfig) -> Result<Arc<dyn LogWriter>> {
    let writer = permgate_log::kafka::KafkaWriter::connect(topic, config.request_timeout())?;
    Ok(Arc::new(writer))
}

#[cfg(not(feature = "kafka"))]
fn cluster_admin(_config: &LogConfig) -> Result<Arc<dyn ClusterAdmin>> {
    anyhow::bail!("permgated was built without the `kafka` feature; no broker client available")
}

#[cfg(not(feature = "kafka"))]
fn log_writer(_topic: &ProvisionedTopic, _config: &LogConfig) -> Result<Arc<dyn LogWriter>> {
    anyhow::bail!("permgated was built without the `kafka` feature; no broker client available")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "cannot listen for ctrl-c; shutting down");
    }
    info!("shutdown requested; draining requests");
}
