//! The sampler subprocess.
//!
//! Started by the consumer with no arguments; the port to connect back to
//! arrives through the environment.

use anyhow::Result;
use lobby_relay::config;
use lobby_relay::integrations::gateway::HttpDirectory;
use lobby_relay::sampler;
use lobby_relay::transport::SamplerLink;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lobby_relay=info".parse()?),
        )
        .init();

    let config = config::load(None)?;
    let directory = Arc::new(HttpDirectory::new(&config.directory));

    let (link, closed) =
        SamplerLink::connect(config.transport.port, config.sampler.connect_retries).await?;

    sampler::run(directory, &config.sampler, link, closed).await
}
