use std::{
    fs::read_to_string,
    net::IpAddr,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match value {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => return Err(format!("unknown log level: {value}")),
        })
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Log {
    ///
    /// log level
    ///
    #[serde(default)]
    pub level: LogLevel,
}

/// Runtime configuration. Every option has a default so a config file
/// is optional and any subset of fields may be present in one.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    ///
    /// local SIP listen port
    ///
    #[serde(default = "Config::sip_port")]
    pub sip_port: u16,
    ///
    /// local address advertised in Via/Contact/SDP
    ///
    #[serde(default = "Config::local_ip")]
    pub local_ip: IpAddr,
    ///
    /// base RTP port
    ///
    #[serde(default = "Config::rtp_port")]
    pub rtp_port: u16,
    ///
    /// span of random RTP ports from base
    ///
    #[serde(default = "Config::rtp_port_range")]
    pub rtp_port_range: u16,
    ///
    /// jitter buffer packet capacity
    ///
    #[serde(default = "Config::jitter_buffer_size")]
    pub jitter_buffer_size: usize,
    ///
    /// jitter buffer target delay, in milliseconds
    ///
    #[serde(default = "Config::jitter_buffer_delay_ms")]
    pub jitter_buffer_delay_ms: u64,
    ///
    /// jitter buffer hard ceiling, in milliseconds
    ///
    #[serde(default = "Config::max_jitter_buffer_delay_ms")]
    pub max_jitter_buffer_delay_ms: u64,
    ///
    /// auto-answer delay for an incoming INVITE, in milliseconds
    ///
    #[serde(default = "Config::ring_duration_ms")]
    pub ring_duration_ms: u64,
    ///
    /// registration lifetime, in seconds
    ///
    #[serde(default = "Config::registration_expires_secs")]
    pub registration_expires_secs: u64,
    ///
    /// logging configuration
    ///
    #[serde(default)]
    pub log: Log,
}

impl Config {
    fn sip_port() -> u16 {
        5060
    }

    fn local_ip() -> IpAddr {
        IpAddr::from([127, 0, 0, 1])
    }

    fn rtp_port() -> u16 {
        10000
    }

    fn rtp_port_range() -> u16 {
        100
    }

    fn jitter_buffer_size() -> usize {
        50
    }

    fn jitter_buffer_delay_ms() -> u64 {
        100
    }

    fn max_jitter_buffer_delay_ms() -> u64 {
        500
    }

    fn ring_duration_ms() -> u64 {
        2000
    }

    fn registration_expires_secs() -> u64 {
        3600
    }

    pub fn jitter_buffer_delay(&self) -> Duration {
        Duration::from_millis(self.jitter_buffer_delay_ms)
    }

    pub fn max_jitter_buffer_delay(&self) -> Duration {
        Duration::from_millis(self.max_jitter_buffer_delay_ms)
    }

    pub fn ring_duration(&self) -> Duration {
        Duration::from_millis(self.ring_duration_ms)
    }

    pub fn registration_expires(&self) -> Duration {
        Duration::from_secs(self.registration_expires_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sip_port: Self::sip_port(),
            local_ip: Self::local_ip(),
            rtp_port: Self::rtp_port(),
            rtp_port_range: Self::rtp_port_range(),
            jitter_buffer_size: Self::jitter_buffer_size(),
            jitter_buffer_delay_ms: Self::jitter_buffer_delay_ms(),
            max_jitter_buffer_delay_ms: Self::max_jitter_buffer_delay_ms(),
            ring_duration_ms: Self::ring_duration_ms(),
            registration_expires_secs: Self::registration_expires_secs(),
            log: Log::default(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
)]
struct Cli {
    ///
    /// Specify the configuration file path
    ///
    /// Example: voip-agent --config /etc/voip-agent/config.toml
    ///
    /// When omitted, built-in defaults are used for every option.
    ///
    #[arg(long, short)]
    config: Option<PathBuf>,
}

impl Config {
    ///
    /// Load configure from config file and command line parameters.
    ///
    /// Load command line parameters, if the configuration file path is
    /// specified, the configuration is read from the configuration file,
    /// otherwise the default configuration is used.
    ///
    pub fn load() -> Result<Self> {
        Ok(match Cli::parse().config {
            Some(path) => toml::from_str(&read_to_string(path)?)?,
            None => Self::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_section_6_5() {
        let config = Config::default();
        assert_eq!(config.sip_port, 5060);
        assert_eq!(config.rtp_port, 10000);
        assert_eq!(config.rtp_port_range, 100);
        assert_eq!(config.jitter_buffer_size, 50);
        assert_eq!(config.jitter_buffer_delay_ms, 100);
        assert_eq!(config.max_jitter_buffer_delay_ms, 500);
        assert_eq!(config.ring_duration_ms, 2000);
        assert_eq!(config.registration_expires_secs, 3600);
    }

    #[test]
    fn partial_toml_fills_in_the_rest_with_defaults() {
        let config: Config = toml::from_str("sip-port = 5070\n").unwrap();
        assert_eq!(config.sip_port, 5070);
        assert_eq!(config.rtp_port, 10000);
    }
}
