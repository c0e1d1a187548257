//! Classification of parsed lines into the action the read loop takes.

use super::event::IrcEvent;
use super::parser::ParsedCommand;

pub const CMD_PING: &str = "PING";
pub const CMD_PRIVMSG: &str = "PRIVMSG";
pub const CMD_JOIN: &str = "JOIN";
pub const CMD_PART: &str = "PART";
pub const CMD_QUIT: &str = "QUIT";

pub const RPL_WELCOME: u16 = 1;
const ERR_NUMERICS: std::ops::RangeInclusive<u16> = 400..=599;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Reply `PONG <token>` before reading the next line.
    Pong(String),
    /// Numeric error reply; logged and otherwise ignored.
    ServerError(u16),
    Event(IrcEvent),
    Ignore,
}

pub fn interpret(cmd: &ParsedCommand<'_>) -> Action {
    if let Some(code) = cmd.numeric() {
        return match code {
            RPL_WELCOME => Action::Event(IrcEvent::Welcome),
            c if ERR_NUMERICS.contains(&c) => Action::ServerError(c),
            _ => Action::Ignore,
        };
    }

    match cmd.command() {
        CMD_PING => match cmd.last_param() {
            Some(token) => Action::Pong(token.to_string()),
            None => Action::Ignore,
        },
        CMD_PRIVMSG => match (cmd.origin_nick(), cmd.param(0), cmd.param(1)) {
            (Some(author), Some(source), Some(content)) => {
                Action::Event(IrcEvent::Message {
                    source: source.to_string(),
                    author: author.to_string(),
                    content: content.to_string(),
                })
            }
            _ => Action::Ignore,
        },
        CMD_JOIN => match (cmd.origin_nick(), cmd.last_param()) {
            (Some(user), Some(channel)) => Action::Event(IrcEvent::Join {
                channel: channel.to_string(),
                user: user.to_string(),
            }),
            _ => Action::Ignore,
        },
        CMD_PART => match (cmd.origin_nick(), cmd.param(0)) {
            (Some(user), Some(channel)) => Action::Event(IrcEvent::Leave {
                channel: channel.to_string(),
                user: user.to_string(),
                reason: cmd.param(1).map(str::to_string),
            }),
            _ => Action::Ignore,
        },
        CMD_QUIT => match cmd.origin_nick() {
            Some(user) => Action::Event(IrcEvent::Quit {
                user: user.to_string(),
                reason: cmd.last_param().map(str::to_string),
            }),
            None => Action::Ignore,
        },
        _ => Action::Ignore,
    }
}
