use anyhow::{Context, Result};
use async_trait::async_trait;
use ircrarria::config::{self, BridgeConfig};
use ircrarria::irc::{EventHandler, IrcClient, IrcError};
use ircrarria::logging;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinError;

/// How long to wait for the server to close the stream after `QUIT`.
const QUIT_GRACE: Duration = Duration::from_secs(5);

/// Mirrors the configured channel to stdout and sets the session up on
/// welcome.
struct Relay {
    channel: String,
    user_mode: String,
    connect_commands: Vec<String>,
}

impl Relay {
    fn from_config(cfg: &BridgeConfig) -> Self {
        Self {
            channel: cfg.irc.channel.clone(),
            user_mode: cfg.irc.user_mode.clone(),
            connect_commands: cfg.irc.connect_commands.clone(),
        }
    }
}

#[async_trait]
impl EventHandler for Relay {
    async fn on_welcome(&self, client: &IrcClient) {
        tracing::info!(channel = %self.channel, "Registered. Joining channel");
        if !self.user_mode.is_empty() {
            if let Err(e) = client.set_self_mode(&self.user_mode).await {
                tracing::warn!(error = %e, "Failed to set user mode");
            }
        }
        for command in &self.connect_commands {
            if let Err(e) = client.execute_raw(command).await {
                tracing::warn!(command = %command, error = %e, "Connect command failed");
            }
        }
        if let Err(e) = client.join_channel(&self.channel).await {
            tracing::error!(channel = %self.channel, error = %e, "Failed to join channel");
        }
    }

    async fn on_message(&self, _client: &IrcClient, source: &str, author: &str, content: &str) {
        if source == self.channel {
            println!("<{}> {}", author, content);
        }
    }

    async fn on_join(&self, _client: &IrcClient, channel: &str, user: &str) {
        if channel == self.channel {
            println!("*** {} joined {}", user, channel);
        }
    }

    async fn on_leave(&self, _client: &IrcClient, channel: &str, user: &str, reason: Option<&str>) {
        if channel != self.channel {
            return;
        }
        match reason {
            Some(reason) => println!("*** {} has left {}: {}", user, channel, reason),
            None => println!("*** {} has left {}.", user, channel),
        }
    }

    async fn on_quit(&self, _client: &IrcClient, user: &str, reason: Option<&str>) {
        match reason {
            Some(reason) => println!("*** {} has quit: {}", user, reason),
            None => println!("*** {} has quit.", user),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::default_config_path);
    let cfg = config::load_config(&path)?;

    let client = Arc::new(IrcClient::new(cfg.connection_params()));
    client.subscribe(Arc::new(Relay::from_config(&cfg)));

    let runner = Arc::clone(&client);
    let mut connection = tokio::spawn(async move { runner.start().await });

    // Each stdin line is relayed to the channel; stdin EOF only stops relaying.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            result = &mut connection => return finish(result),
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(text)) if text.trim().is_empty() => {}
                Ok(Some(text)) => {
                    if let Err(e) = client.send_message(&cfg.irc.channel, &text).await {
                        tracing::warn!(error = %e, "Failed to relay line");
                    }
                }
                Ok(None) | Err(_) => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tracing::info!("Shutting down");
    if let Err(e) = client.request_disconnect().await {
        tracing::debug!(error = %e, "QUIT not sent");
    }
    match tokio::time::timeout(QUIT_GRACE, &mut connection).await {
        Ok(result) => finish(result),
        Err(_) => {
            client.close();
            finish(connection.await)
        }
    }
}

fn finish(result: std::result::Result<std::result::Result<(), IrcError>, JoinError>) -> Result<()> {
    result
        .context("IRC task panicked")?
        .context("IRC connection failed")?;
    Ok(())
}
