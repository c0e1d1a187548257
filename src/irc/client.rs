//! The IRC client: connection lifecycle, the read loop and the write API.
//!
//! A client is single-use. [`IrcClient::start`] connects, registers and then
//! reads until the connection ends; it is meant to run on its own task:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use ircrarria::irc::{ConnectionParams, IrcClient};
//! # async fn demo() {
//! let client = Arc::new(IrcClient::new(ConnectionParams::new("irc.libera.chat", 6667, "bot", "bot")));
//! let runner = Arc::clone(&client);
//! tokio::spawn(async move { runner.start().await });
//! # }
//! ```
//!
//! Write methods may be called from any task while the client is running.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::dispatch::{self, Action};
use super::error::{IrcError, Result};
use super::event::{self, EventHandler, IrcEvent};
use super::parser::ParsedCommand;
use super::transport::Transport;

/// What the read loop does with a line that fails to parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Log the line and keep reading.
    #[default]
    Lenient,
    /// Terminate the connection with [`IrcError::MalformedLine`].
    Strict,
}

/// Connection parameters, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub nickname: String,
    pub use_tls: bool,
    /// Accept any server certificate. Dangerous; local/testing use only.
    pub skip_cert_validation: bool,
    /// Log every inbound line.
    pub log_traffic: bool,
    pub malformed: MalformedPolicy,
}

impl ConnectionParams {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        nickname: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            nickname: nickname.into(),
            use_tls: false,
            skip_cert_validation: false,
            log_traffic: false,
            malformed: MalformedPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Dead,
    Starting,
    Running,
}

enum Phase {
    Fresh,
    Starting,
    Running(Arc<Transport>),
    Dead,
}

pub struct IrcClient {
    params: ConnectionParams,
    phase: Mutex<Phase>,
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl IrcClient {
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            phase: Mutex::new(Phase::Fresh),
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler. Handlers are invoked in registration order.
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().push(handler);
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn state(&self) -> ConnectionState {
        match *self.phase.lock() {
            Phase::Fresh | Phase::Dead => ConnectionState::Dead,
            Phase::Starting => ConnectionState::Starting,
            Phase::Running(_) => ConnectionState::Running,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state() == ConnectionState::Running
    }

    /// Connect, register and run the read loop until the connection ends.
    ///
    /// Returns `Ok(())` when the server closes the stream or the client is
    /// closed, and an error for connection failures, read errors and (with
    /// [`MalformedPolicy::Strict`]) malformed lines. The client is dead
    /// afterwards in every case.
    pub async fn start(&self) -> Result<()> {
        self.begin_start()?;

        let p = &self.params;
        tracing::info!(host = %p.host, port = p.port, tls = p.use_tls, "Connecting to IRC server");

        let transport =
            match Transport::open(&p.host, p.port, p.use_tls, p.skip_cert_validation).await {
                Ok(transport) => Arc::new(transport),
                Err(e) => {
                    self.teardown();
                    return Err(e);
                }
            };

        if !self.promote(Arc::clone(&transport)) {
            tracing::info!(host = %p.host, "Client closed while starting");
            transport.dispose();
            return Ok(());
        }

        let result = match self.run(&transport).await {
            Err(IrcError::Io(e)) if transport.is_disposed() => {
                tracing::debug!(error = %e, "Read loop ended after the transport was disposed");
                Ok(())
            }
            other => other,
        };
        self.teardown();
        result
    }

    pub async fn send_message(&self, target: &str, text: &str) -> Result<()> {
        self.send_line(&format!("PRIVMSG {} :{}", target, text)).await
    }

    pub async fn execute_raw(&self, raw: &str) -> Result<()> {
        self.send_line(raw).await
    }

    pub async fn set_self_mode(&self, mode: &str) -> Result<()> {
        self.send_line(&format!("MODE {} {}", self.params.nickname, mode))
            .await
    }

    pub async fn join_channel(&self, channel: &str) -> Result<()> {
        self.send_line(&format!("JOIN {}", channel)).await
    }

    /// Ask the server to end the session. The read loop ends once the server
    /// closes the stream.
    pub async fn request_disconnect(&self) -> Result<()> {
        self.send_line("QUIT").await
    }

    /// Dispose the transport and mark the client dead. Wakes a pending read
    /// so [`IrcClient::start`] returns. Idempotent.
    pub fn close(&self) {
        self.teardown();
    }

    fn begin_start(&self) -> Result<()> {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Fresh => {
                *phase = Phase::Starting;
                Ok(())
            }
            Phase::Starting | Phase::Running(_) => Err(IrcError::AlreadyRunning),
            Phase::Dead => Err(IrcError::Terminated),
        }
    }

    fn promote(&self, transport: Arc<Transport>) -> bool {
        let mut phase = self.phase.lock();
        if matches!(*phase, Phase::Starting) {
            *phase = Phase::Running(transport);
            true
        } else {
            false
        }
    }

    fn transport(&self) -> Result<Arc<Transport>> {
        match &*self.phase.lock() {
            Phase::Running(transport) => Ok(Arc::clone(transport)),
            _ => Err(IrcError::NotRunning),
        }
    }

    fn teardown(&self) {
        let previous = std::mem::replace(&mut *self.phase.lock(), Phase::Dead);
        if let Phase::Running(transport) = previous {
            transport.dispose();
            tracing::info!(host = %self.params.host, "IRC connection torn down");
        }
    }

    async fn send_line(&self, line: &str) -> Result<()> {
        let transport = self.transport()?;
        match transport.write_line(line).await {
            Err(IrcError::Io(e)) => {
                tracing::warn!(host = %self.params.host, error = %e, "Write failed. Closing connection");
                transport.dispose();
                Err(IrcError::Io(e))
            }
            other => other,
        }
    }

    async fn run(&self, transport: &Transport) -> Result<()> {
        let p = &self.params;
        transport.write_line(&format!("NICK {}", p.nickname)).await?;
        transport
            .write_line(&format!("USER {0} 0 * :{0}", p.username))
            .await?;

        loop {
            let line = match transport.read_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e @ IrcError::MalformedLine(_)) => {
                    self.reject_malformed(e)?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            if p.log_traffic {
                tracing::info!("> {}", line);
            }

            let parsed = match ParsedCommand::parse(&line) {
                Ok(parsed) => parsed,
                Err(e) => {
                    self.reject_malformed(e)?;
                    continue;
                }
            };

            match dispatch::interpret(&parsed) {
                Action::Pong(token) => {
                    tracing::trace!(token = %token, "Received PING, responding with PONG");
                    transport.write_line(&format!("PONG {}", token)).await?;
                }
                Action::ServerError(code) => {
                    tracing::warn!(code, raw_line = %line, "IRC error reply");
                }
                Action::Event(event) => self.dispatch(&event).await,
                Action::Ignore => {}
            }
        }

        tracing::info!(host = %p.host, "Connection closed by server (EOF)");
        Ok(())
    }

    /// Apply the malformed-line policy: `Ok` to keep reading.
    fn reject_malformed(&self, e: IrcError) -> Result<()> {
        let raw_line = match &e {
            IrcError::MalformedLine(line) => line.as_str(),
            _ => "",
        };
        match self.params.malformed {
            MalformedPolicy::Lenient => {
                tracing::error!(raw_line = %raw_line, "IRC server sent malformed message. Skipping line");
                Ok(())
            }
            MalformedPolicy::Strict => {
                tracing::error!(raw_line = %raw_line, "IRC server sent malformed message. Terminating");
                Err(e)
            }
        }
    }

    async fn dispatch(&self, event: &IrcEvent) {
        let handlers: Vec<Arc<dyn EventHandler>> = self.handlers.read().clone();
        for handler in &handlers {
            event::deliver(handler.as_ref(), self, event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnectionParams {
        ConnectionParams::new("127.0.0.1", 1, "user", "nick")
    }

    #[tokio::test]
    async fn test_writes_require_running() {
        let client = IrcClient::new(params());
        assert_eq!(client.state(), ConnectionState::Dead);
        assert!(!client.is_alive());

        assert!(matches!(client.send_message("#c", "hi").await, Err(IrcError::NotRunning)));
        assert!(matches!(client.execute_raw("PING x").await, Err(IrcError::NotRunning)));
        assert!(matches!(client.set_self_mode("+B").await, Err(IrcError::NotRunning)));
        assert!(matches!(client.join_channel("#c").await, Err(IrcError::NotRunning)));
        assert!(matches!(client.request_disconnect().await, Err(IrcError::NotRunning)));
    }

    #[tokio::test]
    async fn test_closed_client_cannot_start() {
        let client = IrcClient::new(params());
        client.close();
        client.close();
        assert!(matches!(client.start().await, Err(IrcError::Terminated)));
    }

    #[tokio::test]
    async fn test_failed_start_is_terminal() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = IrcClient::new(ConnectionParams::new("127.0.0.1", port, "user", "nick"));
        assert!(matches!(client.start().await, Err(IrcError::Connect(_))));
        assert_eq!(client.state(), ConnectionState::Dead);
        assert!(matches!(client.start().await, Err(IrcError::Terminated)));
    }

    #[test]
    fn test_malformed_policy_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            malformed: MalformedPolicy,
        }
        let strict: Wrapper = toml::from_str("malformed = \"strict\"").unwrap();
        assert_eq!(strict.malformed, MalformedPolicy::Strict);
        assert_eq!(MalformedPolicy::default(), MalformedPolicy::Lenient);
    }
}
