// ABOUTME: Entry point for the storyforge binary.
// ABOUTME: Parses CLI arguments, initializes tracing, builds the swarm, and starts the HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use storyforge_agent::client::create_completion_client;
use storyforge_agent::tools::builtin_registry;
use storyforge_agent::{Agent, Swarm};
use storyforge_core::config::default_roster;
use storyforge_server::{AppState, ServerConfig, create_router};
use storyforge_tracker::TrackerClient;

/// Multi-agent user story optimizer.
#[derive(Debug, Parser)]
#[command(name = "storyforge", version, about)]
struct Cli {
    /// Socket address to bind, overriding STORYFORGE_BIND.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storyforge=debug,tower_http=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig::from_env().context("invalid server configuration")?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }

    let (client, model) = create_completion_client(&config.provider, config.model.as_deref())
        .context("failed to create completion client")?;
    tracing::info!(provider = %config.provider, model = %model, "completion client ready");

    let roster = default_roster();
    let registry = builtin_registry(&roster);
    let agents: Vec<Agent> = roster
        .iter()
        .map(|agent_config| Agent::from_config(agent_config, &model))
        .collect();
    let swarm = Swarm::new(agents, registry, client).context("invalid agent roster")?;

    let tracker = match TrackerClient::from_env() {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "issue tracker disabled");
            None
        }
    };

    let state = Arc::new(AppState::new(
        Arc::new(swarm),
        config.run_config(),
        model,
        tracker,
    ));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(addr = %config.bind, "storyforge listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
