//! Events raised by the read loop and the observer trait that receives them.
//!
//! Handlers run in-line on the task driving [`IrcClient::start`], in wire
//! order. A handler may call back into the client's write methods; the write
//! lock is independent of the read path.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::client::IrcClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcEvent {
    /// Registration completed (`001`). Fired again on every later `001`.
    Welcome,
    Message {
        source: String,
        author: String,
        content: String,
    },
    Join {
        channel: String,
        user: String,
    },
    Leave {
        channel: String,
        user: String,
        reason: Option<String>,
    },
    Quit {
        user: String,
        reason: Option<String>,
    },
}

/// Observer for client events. Every method defaults to a no-op.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_welcome(&self, _client: &IrcClient) {}

    async fn on_message(&self, _client: &IrcClient, _source: &str, _author: &str, _content: &str) {}

    async fn on_join(&self, _client: &IrcClient, _channel: &str, _user: &str) {}

    async fn on_leave(&self, _client: &IrcClient, _channel: &str, _user: &str, _reason: Option<&str>) {}

    async fn on_quit(&self, _client: &IrcClient, _user: &str, _reason: Option<&str>) {}
}

/// Route an event to the matching handler method.
pub(crate) async fn deliver(handler: &dyn EventHandler, client: &IrcClient, event: &IrcEvent) {
    match event {
        IrcEvent::Welcome => handler.on_welcome(client).await,
        IrcEvent::Message {
            source,
            author,
            content,
        } => handler.on_message(client, source, author, content).await,
        IrcEvent::Join { channel, user } => handler.on_join(client, channel, user).await,
        IrcEvent::Leave {
            channel,
            user,
            reason,
        } => handler.on_leave(client, channel, user, reason.as_deref()).await,
        IrcEvent::Quit { user, reason } => handler.on_quit(client, user, reason.as_deref()).await,
    }
}

/// Forwards every event into a channel, for consumers that prefer a stream.
/// Events sent after the receiver is dropped are discarded.
#[async_trait]
impl EventHandler for mpsc::UnboundedSender<IrcEvent> {
    async fn on_welcome(&self, _client: &IrcClient) {
        let _ = self.send(IrcEvent::Welcome);
    }

    async fn on_message(&self, _client: &IrcClient, source: &str, author: &str, content: &str) {
        let _ = self.send(IrcEvent::Message {
            source: source.to_string(),
            author: author.to_string(),
            content: content.to_string(),
        });
    }

    async fn on_join(&self, _client: &IrcClient, channel: &str, user: &str) {
        let _ = self.send(IrcEvent::Join {
            channel: channel.to_string(),
            user: user.to_string(),
        });
    }

    async fn on_leave(&self, _client: &IrcClient, channel: &str, user: &str, reason: Option<&str>) {
        let _ = self.send(IrcEvent::Leave {
            channel: channel.to_string(),
            user: user.to_string(),
            reason: reason.map(str::to_string),
        });
    }

    async fn on_quit(&self, _client: &IrcClient, user: &str, reason: Option<&str>) {
        let _ = self.send(IrcEvent::Quit {
            user: user.to_string(),
            reason: reason.map(str::to_string),
        });
    }
}
