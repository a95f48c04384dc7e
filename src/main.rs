//! Server binary: wire configuration, model, and orchestrator, then serve.

use anyhow::Context;
use std::sync::Arc;

use inbox_agent::{
    app, AgentConfig, AppState, ConversationStore, LlmClient, Orchestrator, PromptRouter,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = AgentConfig::from_env().context("loading configuration")?;
    log::info!("Starting inbox-agent with {:?}", config);

    let model = Arc::new(LlmClient::from_config(&config).context("building LLM client")?);
    let store = Arc::new(ConversationStore::new(config.max_history_entries()));
    let router = Arc::new(PromptRouter::with_defaults());

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        store,
        router,
        model.clone(),
    ));

    let state = AppState {
        orchestrator,
        model,
        config: config.clone(),
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("binding {}", config.bind_addr()))?;
    log::info!("Listening on {}", config.bind_addr());

    axum::serve(listener, app(state))
        .await
        .context("serving HTTP")?;
    Ok(())
}
