mod agent;
mod classify;
mod config;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

// Installed process-wide so the runtime collector reports real heap figures.
#[global_allocator]
static ALLOC: metrond_collector::alloc::CountingAlloc = metrond_collector::alloc::CountingAlloc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("metrond=info".parse()?))
        .init();

    let config = config::AgentConfig::load()?;
    let agent = agent::Agent::new(config)?;
    agent.run().await
}
