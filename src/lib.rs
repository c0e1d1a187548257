//! A minimal IRC protocol client.
//!
//! [`irc::IrcClient`] owns one connection: it connects (optionally over
//! TLS), registers, answers keepalives and turns inbound lines into events
//! delivered to registered [`irc::EventHandler`]s.

pub mod config;
pub mod irc;
pub mod logging;
