pub mod config;
pub mod error;
pub mod logger;
pub mod sdp;
pub mod transport;
pub mod ua;

use std::sync::Arc;

use self::config::Config;
use self::transport::UdpTransport;
use self::ua::UserAgent;

/// Default AOR user-part this agent registers and places calls as, absent
/// any richer multi-account configuration.
const LOCAL_USER: &str = "agent";

/// In order to let integration tests directly use this crate and start the
/// agent, a function is exposed to replace the main function to directly
/// start the user-agent.
pub async fn startup(config: Arc<Config>) -> anyhow::Result<()> {
    let transport = Arc::new(UdpTransport::bind_ports(config.sip_port, config.rtp_port).await?);
    let agent = UserAgent::new(config, transport, LOCAL_USER.to_string());

    agent.run().await?;
    Ok(())
}
