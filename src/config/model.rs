//! Configuration data model.
//!
//! Mirrors the `ircrarria.toml` layout: a `[host]` table describing where to
//! connect and an `[irc]` table describing who to be once connected.

use serde::{Deserialize, Serialize};

use crate::irc::{ConnectionParams, MalformedPolicy};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub host: HostConfig,
    pub irc: IrcConfig,
}

impl BridgeConfig {
    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            host: self.host.hostname.clone(),
            port: self.host.port,
            username: self.irc.username.clone(),
            nickname: self.irc.nickname.clone(),
            use_tls: self.host.ssl,
            skip_cert_validation: self.host.skip_cert_validation,
            log_traffic: self.irc.log_traffic,
            malformed: self.irc.malformed,
        }
    }
}

/// Server address and transport security.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Hostname or IP address of the IRC server. Also used for TLS
    /// certificate validation.
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default)]
    pub skip_cert_validation: bool,
}

/// Identity and behaviour once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrcConfig {
    pub username: String,
    pub nickname: String,
    /// Channel the relay joins and mirrors.
    pub channel: String,
    /// Mode string applied to our own nick on welcome (empty to skip).
    #[serde(default = "default_user_mode")]
    pub user_mode: String,
    /// Raw lines sent after welcome, before joining the channel.
    #[serde(default)]
    pub connect_commands: Vec<String>,
    #[serde(default)]
    pub log_traffic: bool,
    #[serde(default)]
    pub malformed: MalformedPolicy,
}

fn default_port() -> u16 {
    6667
}
fn default_user_mode() -> String {
    "+B".to_string()
}
