// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Outpost Orchestrator Daemon
//!
//! The `outpost` binary boots a security-agent swarm from one deployment
//! file and serves the operator HTTP surface.
//!
//! ## Commands
//!
//! - `outpost serve` - Run the orchestrator and agents
//! - `outpost validate` - Check a deployment file without starting anything

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{debug, info, warn};

use outpost_core::application::correlation::CorrelationEngine;
use outpost_core::application::deployment::DeploymentConfig;
use outpost_core::application::monitoring::{MonitorAgent, MonitorPeers};
use outpost_core::application::orchestrator::Orchestrator;
use outpost_core::application::runtime::{AgentContext, AgentError, SecurityAgent};
use outpost_core::application::secrets::{SecretStore, VaultAgent};
use outpost_core::domain::action::{AgentAction, AgentObservation, AgentVerification};
use outpost_core::domain::agent::{AgentConfig, AgentRole};
use outpost_core::domain::message::AgentMessage;
use outpost_core::infrastructure::adapters::{NullAdapter, StaticIntelFeed};
use outpost_core::infrastructure::notify::WebhookNotifier;
use outpost_core::infrastructure::signal_bus::SignalBus;
use outpost_core::presentation::api;

/// Outpost - autonomous security swarm orchestrator
#[derive(Parser)]
#[command(name = "outpost")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the deployment file
    #[arg(
        short,
        long,
        global = true,
        env = "OUTPOST_CONFIG_PATH",
        value_name = "FILE",
        default_value = "deployment.yaml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "OUTPOST_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator and agents
    Serve {
        /// HTTP API listen address
        #[arg(long, env = "OUTPOST_LISTEN", default_value = "127.0.0.1:8080")]
        listen: SocketAddr,

        /// Prometheus exporter listen address
        #[arg(long, env = "OUTPOST_METRICS_LISTEN", default_value = "127.0.0.1:9090")]
        metrics_listen: SocketAddr,
    },

    /// Check a deployment file without starting anything
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Serve {
            listen,
            metrics_listen,
        } => serve(&cli.config, listen, metrics_listen).await,
        Commands::Validate => validate(&cli.config),
    }
}

async fn serve(config: &PathBuf, listen: SocketAddr, metrics_listen: SocketAddr) -> Result<()> {
    let deployment = DeploymentConfig::load(config)
        .with_context(|| format!("loading deployment from {}", config.display()))?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(metrics_listen)
        .install()
        .context("starting prometheus exporter")?;
    info!(%metrics_listen, "metrics exporter listening");

    let bus = SignalBus::with_default_capacity();
    let orchestrator = Orchestrator::new(
        bus,
        deployment.orchestrator_settings(),
        Arc::new(WebhookNotifier::new()),
    );

    for agent_config in &deployment.agents {
        let agent: Arc<dyn SecurityAgent> = match agent_config.role {
            AgentRole::SiemCorrelation => Arc::new(MonitorAgent::new(
                agent_config.clone(),
                MonitorPeers {
                    waf: deployment.monitor.waf.clone(),
                    zero_trust: deployment.monitor.zero_trust.clone(),
                },
                CorrelationEngine::new(deployment.correlation_rules.clone()),
                Arc::new(NullAdapter),
                Arc::new(StaticIntelFeed::default()),
            )),
            AgentRole::SecretsLifecycle => Arc::new(VaultAgent::new(
                agent_config.clone(),
                SecretStore::with_default_policies(),
                Arc::new(NullAdapter),
            )),
            // Roles without a built-in implementation get a passive stand-in
            // so DAG routing and runbooks still have a live endpoint.
            _ => {
                warn!(agent = %agent_config.id, role = ?agent_config.role, "no built-in implementation, running passive stand-in");
                Arc::new(PassiveAgent {
                    config: agent_config.clone(),
                })
            }
        };
        orchestrator
            .register(agent)
            .with_context(|| format!("registering agent '{}'", agent_config.id))?;
    }

    orchestrator.start().await;
    info!(agents = orchestrator.agent_count(), "swarm running");

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    info!(%listen, "api listening");
    axum::serve(listener, api::router(orchestrator.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("api server failed")?;

    info!("shutting down");
    orchestrator.shutdown().await;
    Ok(())
}

fn validate(config: &PathBuf) -> Result<()> {
    match DeploymentConfig::load(config) {
        Ok(deployment) => {
            println!(
                "{} {} ({} agents, {} dag edges, {} runbooks, {} rules)",
                "valid:".green().bold(),
                config.display(),
                deployment.agents.len(),
                deployment.dag.len(),
                deployment.runbooks.len(),
                deployment.correlation_rules.len(),
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {e}", "invalid:".red().bold());
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
}

/// Stand-in for roles whose real implementation runs elsewhere. Never
/// cycles; acknowledges and logs whatever the orchestrator delivers.
struct PassiveAgent {
    config: AgentConfig,
}

#[async_trait]
impl SecurityAgent for PassiveAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn observe(&self, _ctx: &AgentContext) -> Result<Vec<AgentObservation>, AgentError> {
        Ok(Vec::new())
    }

    async fn act(
        &self,
        _ctx: &AgentContext,
        _significant: &[AgentObservation],
    ) -> Result<Vec<AgentAction>, AgentError> {
        Ok(Vec::new())
    }

    async fn verify(
        &self,
        _ctx: &AgentContext,
        action: &AgentAction,
    ) -> Result<AgentVerification, AgentError> {
        Ok(AgentVerification::new(action.id, true, 1.0))
    }

    async fn handle_message(
        &self,
        _ctx: &AgentContext,
        message: AgentMessage,
    ) -> Result<(), AgentError> {
        debug!(
            agent = %self.config.id,
            from = %message.from,
            r#type = %message.message_type,
            payload = %message.payload,
            "message acknowledged by passive stand-in"
        );
        Ok(())
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
