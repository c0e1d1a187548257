//! Protocol line parser.
//!
//! Turns one raw line into a [`ParsedCommand`]: an optional origin prefix, a
//! command token and the ordered parameter list (middle parameters followed
//! by the trailing parameter, if any). The parser is pure and borrows from
//! the input line.

use super::error::{IrcError, Result};

/// One parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    origin: Option<&'a str>,
    command: &'a str,
    params: Vec<&'a str>,
}

impl<'a> ParsedCommand<'a> {
    /// Parse a single line. Any trailing `\r`/`\n` is ignored.
    ///
    /// A line is malformed when it is empty, when an origin prefix is not
    /// followed by a space, when the first `:` after the origin is the last
    /// character of the line, or when no valid command token remains. A
    /// valid command token is either all ASCII letters or a three-digit
    /// numeric reply code.
    pub fn parse(input: &'a str) -> Result<Self> {
        let line = input.trim_end_matches(['\r', '\n']);
        let malformed = || IrcError::MalformedLine(line.to_string());

        if line.is_empty() {
            return Err(malformed());
        }

        let (origin, rest) = match line.strip_prefix(':') {
            Some(prefixed) => {
                let space_idx = prefixed.find(' ').ok_or_else(malformed)?;
                (Some(&prefixed[..space_idx]), &prefixed[space_idx + 1..])
            }
            None => (None, line),
        };

        // The trailing-parameter scan starts after the origin, never at 0
        // when an origin is present.
        let (segment, trailing) = match rest.find(':') {
            Some(colon_idx) => {
                let trailing = &rest[colon_idx + 1..];
                if trailing.is_empty() {
                    return Err(malformed());
                }
                (&rest[..colon_idx], Some(trailing))
            }
            None => (rest, None),
        };

        let mut tokens = segment.split(' ').filter(|t| !t.is_empty());
        let command = tokens.next().ok_or_else(malformed)?;
        if !is_command_token(command) {
            return Err(malformed());
        }

        let mut params: Vec<&'a str> = tokens.collect();
        params.extend(trailing);

        Ok(Self {
            origin,
            command,
            params,
        })
    }

    pub fn origin(&self) -> Option<&'a str> {
        self.origin
    }

    pub fn command(&self) -> &'a str {
        self.command
    }

    pub fn params(&self) -> &[&'a str] {
        &self.params
    }

    pub fn param(&self, index: usize) -> Option<&'a str> {
        self.params.get(index).copied()
    }

    pub fn last_param(&self) -> Option<&'a str> {
        self.params.last().copied()
    }

    /// The numeric reply code, if the command is a three-digit numeric.
    pub fn numeric(&self) -> Option<u16> {
        if self.command.bytes().all(|b| b.is_ascii_digit()) {
            self.command.parse().ok()
        } else {
            None
        }
    }

    /// The sender's nickname: the origin with everything from `!` stripped.
    pub fn origin_nick(&self) -> Option<&'a str> {
        self.origin.map(|origin| origin.split('!').next().unwrap_or(origin))
    }
}

fn is_command_token(token: &str) -> bool {
    token.bytes().all(|b| b.is_ascii_alphabetic())
        || (token.len() == 3 && token.bytes().all(|b| b.is_ascii_digit()))
}
