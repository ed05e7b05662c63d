#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::sync::Arc;

use voip_agent::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::load()?);
    voip_agent::logger::init(&config)?;

    log::info!(
        "starting voip-agent: sip_port={} rtp_port={}",
        config.sip_port,
        config.rtp_port
    );

    voip_agent::startup(config).await
}
