// Chat module
// Per-conversation logs and the responders that extend them

pub mod generative;


use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::engine::QueryEngine;

pub use generative::{GenerativeChat, TextCompletion};

pub const UNAVAILABLE_REPLY: &str =
    "Sorry, I can't look that up right now. Please try again in a moment.";
pub const OUT_OF_SERVICE_REPLY: &str =
    "Sorry, I can't answer questions until my knowledge base is rebuilt.";
pub const NO_ANSWER_REPLY: &str = "Sorry, I don't have an answer for that yet.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    User,
    Bot,
}

impl fmt::Display for Speaker {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("You"),
            Self::Bot => f.write_str("Bot"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub speaker: Speaker,
    pub text: String,
}

/// Append-only transcript of one conversation.
///
/// Owned by the caller and threaded through each `respond` call; turns are
/// never edited or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationLog {
    turns: Vec<ChatTurn>,
}

impl ConversationLog {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.turns.push(ChatTurn {
            speaker,
            text: text.into(),
        });
    }

    #[inline]
    #[must_use]
    pub fn with_turn(mut self, speaker: Speaker, text: impl Into<String>) -> Self {
        self.push(speaker, text);
        self
    }

    #[inline]
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[inline]
    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }
}

/// What the user sees after sending a message
#[derive(Debug, Clone, PartialEq)]
pub enum ChatReply {
    /// `distance` is set when the text came from the QA table
    Answer { text: String, distance: Option<f32> },
    /// Nothing could be looked up. When `retryable` the user may try again
    /// later; otherwise the index must be rebuilt first.
    Unavailable { retryable: bool },
    /// The message was empty and was not recorded
    BadInput,
    /// The lookup ran but produced nothing
    NoAnswer,
}

impl ChatReply {
    /// Text to show for this reply
    #[inline]
    pub fn display_text(&self) -> &str {
        match self {
            Self::Answer { text, .. } => text,
            Self::Unavailable { retryable: true } => UNAVAILABLE_REPLY,
            Self::Unavailable { retryable: false } => OUT_OF_SERVICE_REPLY,
            Self::BadInput => "Please type a question.",
            Self::NoAnswer => NO_ANSWER_REPLY,
        }
    }
}

/// Answers each message with the nearest stored answer
pub struct RetrievalChat {
    engine: Arc<QueryEngine>,
}

impl RetrievalChat {
    #[inline]
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }

    #[inline]
    pub fn respond(&self, log: ConversationLog, input: &str) -> (ConversationLog, ChatReply) {
        let input = input.trim();
        if input.is_empty() {
            return (log, ChatReply::BadInput);
        }

        let log = log.with_turn(Speaker::User, input);

        match self.engine.answer(input, 1) {
            Ok(results) => match results.into_iter().next() {
                Some(best) => {
                    debug!("Answered from row {} at distance {}", best.row, best.distance);
                    let log = log.with_turn(Speaker::Bot, best.answer.clone());
                    (
                        log,
                        ChatReply::Answer {
                            text: best.answer,
                            distance: Some(best.distance),
                        },
                    )
                }
                None => (log.with_turn(Speaker::Bot, NO_ANSWER_REPLY), ChatReply::NoAnswer),
            },
            Err(e) => {
                warn!("Chat lookup failed: {}", e);
                let reply = ChatReply::Unavailable {
                    retryable: e.is_retryable(),
                };
                (log.with_turn(Speaker::Bot, reply.display_text()), reply)
            }
        }
    }
}
