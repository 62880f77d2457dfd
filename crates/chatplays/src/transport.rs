//! Chat Transport
//!
//! Turns raw chat messages into engine tokens. A message is either a vote for
//! a command or, when a privileged user prefixes it with `!`, a host command.

use crate::commands::VoteOrigin;

/// Longer messages are dropped outright
pub const MAX_MESSAGE_LEN: usize = 128;

/// Longer messages are never votes
pub const MAX_COMMAND_LEN: usize = 32;

/// One inbound chat line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub text: String,
    /// Sent by the channel owner
    pub privileged: bool,
}

impl ChatMessage {
    pub fn new(text: impl Into<String>, privileged: bool) -> Self {
        Self {
            text: text.into(),
            privileged,
        }
    }
}

/// A tokenized chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatToken {
    Vote { command: String, origin: VoteOrigin },
    Host { args: Vec<String> },
}

/// Tokenize a chat message; `None` when it carries nothing for the engine
pub fn tokenize(message: &ChatMessage) -> Option<ChatToken> {
    let length = message.text.chars().count();
    if length == 0 || length > MAX_MESSAGE_LEN {
        return None;
    }

    let text = message.text.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }

    if message.privileged {
        if let Some(rest) = text.strip_prefix('!') {
            let args: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
            if args.is_empty() {
                return None;
            }
            return Some(ChatToken::Host { args });
        }
    }

    if length > MAX_COMMAND_LEN {
        return None;
    }

    let origin = if message.privileged {
        VoteOrigin::Privileged
    } else {
        VoteOrigin::Crowd
    };
    Some(ChatToken::Vote {
        command: text,
        origin,
    })
}
