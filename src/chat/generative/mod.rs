// Free-text replies from a completion model, conditioned on the recent conversation


use anyhow::Result;
use tracing::{debug, warn};

use super::{ChatReply, ConversationLog, NO_ANSWER_REPLY, Speaker, UNAVAILABLE_REPLY};
use crate::config::GenerativeConfig;

pub const USER_MARKER: &str = "<|user|>";
pub const BOT_MARKER: &str = "<|bot|>";

const DEFAULT_MAX_CONTEXT_TOKENS: usize = 800;
const DEFAULT_MAX_LENGTH: usize = 1000;

/// Continues a prompt with at most `max_tokens` new tokens
pub trait TextCompletion: Send + Sync {
    fn complete(&self, context: &str, max_tokens: usize) -> Result<String>;
}

/// Prompt sent to the model for one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptWindow {
    pub text: String,
    pub tokens: usize,
    /// Tokens the model may add before the total hits the length limit
    pub budget: usize,
}

pub struct GenerativeChat<C> {
    completion: C,
    max_context_tokens: usize,
    max_length: usize,
}

impl<C: TextCompletion> GenerativeChat<C> {
    #[inline]
    pub fn new(completion: C) -> Self {
        Self {
            completion,
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }

    #[inline]
    pub fn from_config(completion: C, config: &GenerativeConfig) -> Self {
        Self::new(completion).with_limits(config.max_context_tokens, config.max_length)
    }

    /// Keep at most `max_context_tokens` of history and stop generation at `max_length` total
    #[inline]
    pub fn with_limits(mut self, max_context_tokens: usize, max_length: usize) -> Self {
        self.max_context_tokens = max_context_tokens.max(1);
        self.max_length = max_length.max(self.max_context_tokens + 1);
        self
    }

    /// History plus the new message, cut to the most recent tokens
    #[inline]
    pub fn prompt_for(&self, log: &ConversationLog, input: &str) -> PromptWindow {
        let mut tokens: Vec<&str> = Vec::new();
        for turn in log.turns() {
            tokens.push(match turn.speaker {
                Speaker::User => USER_MARKER,
                Speaker::Bot => BOT_MARKER,
            });
            tokens.extend(turn.text.split_whitespace());
        }
        tokens.push(USER_MARKER);
        tokens.extend(input.split_whitespace());
        tokens.push(BOT_MARKER);

        let start = tokens.len().saturating_sub(self.max_context_tokens);
        let window = &tokens[start..];

        PromptWindow {
            text: window.join(" "),
            tokens: window.len(),
            budget: self.max_length - window.len(),
        }
    }

    #[inline]
    pub fn respond(&self, log: ConversationLog, input: &str) -> (ConversationLog, ChatReply) {
        let input = input.trim();
        if input.is_empty() {
            return (log, ChatReply::BadInput);
        }

        let prompt = self.prompt_for(&log, input);
        debug!(
            "Generating reply from {} context tokens, budget {}",
            prompt.tokens, prompt.budget
        );
        let log = log.with_turn(Speaker::User, input);

        match self.completion.complete(&prompt.text, prompt.budget) {
            Ok(text) => {
                // Models sometimes continue the transcript; keep only the first reply
                let reply = text
                    .split(USER_MARKER)
                    .next()
                    .unwrap_or_default()
                    .replace(BOT_MARKER, "")
                    .trim()
                    .to_string();
                if reply.is_empty() {
                    return (log.with_turn(Speaker::Bot, NO_ANSWER_REPLY), ChatReply::NoAnswer);
                }
                (
                    log.with_turn(Speaker::Bot, reply.clone()),
                    ChatReply::Answer {
                        text: reply,
                        distance: None,
                    },
                )
            }
            Err(e) => {
                warn!("Completion failed: {:#}", e);
                (
                    log.with_turn(Speaker::Bot, UNAVAILABLE_REPLY),
                    ChatReply::Unavailable { retryable: true },
                )
            }
        }
    }
}
