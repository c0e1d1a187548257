//! IRC protocol layer: transport, line parsing, connection lifecycle and
//! event dispatch.

pub mod client;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod parser;
pub mod tls;
pub mod transport;

pub use client::{ConnectionParams, ConnectionState, IrcClient, MalformedPolicy};
pub use error::IrcError;
pub use event::{EventHandler, IrcEvent};
pub use parser::ParsedCommand;
