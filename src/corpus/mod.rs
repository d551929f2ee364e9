// Corpus preparation module
// Turns conversational transcripts into the ordered question/answer table


pub mod sources;

use clap::ValueEnum;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

pub use sources::{TranscriptFormat, load_conversations, load_qa_csv, save_qa_csv};

/// One retrievable question/answer pair. Its row position in the QA table is its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaRecord {
    pub question: String,
    pub answer: String,
}

impl QaRecord {
    #[inline]
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// An ordered sequence of utterances with alternating speakers
pub type Conversation = Vec<String>;

/// How consecutive turns of a conversation are paired into QA records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PairingPolicy {
    /// Emit `(turn[i], turn[i+1])` whenever `turn[i]` ends with `?`
    #[default]
    Interrogative,
    /// Emit `(turn[0], turn[1])`, `(turn[2], turn[3])`, ... unconditionally
    Alternating,
}

impl fmt::Display for PairingPolicy {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrogative => write!(f, "interrogative"),
            Self::Alternating => write!(f, "alternating"),
        }
    }
}

/// Statistics from one preparation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparationStats {
    pub conversations_seen: usize,
    pub conversations_skipped: usize,
    pub records_emitted: usize,
}

/// Pair transcript turns into QA records under the given policy.
///
/// Utterances are trimmed and blank ones dropped before pairing. Conversations
/// left with fewer than two utterances are skipped. Output order follows
/// conversation order, then turn order.
#[inline]
pub fn prepare_records(conversations: &[Conversation], policy: PairingPolicy) -> Vec<QaRecord> {
    prepare_records_with_stats(conversations, policy).0
}

#[inline]
pub fn prepare_records_with_stats(
    conversations: &[Conversation],
    policy: PairingPolicy,
) -> (Vec<QaRecord>, PreparationStats) {
    let mut stats = PreparationStats::default();
    let mut records = Vec::new();

    for conversation in conversations {
        stats.conversations_seen += 1;

        let turns: Vec<&str> = conversation
            .iter()
            .map(|turn| turn.trim())
            .filter(|turn| !turn.is_empty())
            .collect();

        if turns.len() < 2 {
            stats.conversations_skipped += 1;
            continue;
        }

        match policy {
            PairingPolicy::Interrogative => {
                for (question, answer) in turns.iter().tuple_windows() {
                    if question.ends_with('?') {
                        records.push(QaRecord::new(*question, *answer));
                    }
                }
            }
            PairingPolicy::Alternating => {
                for (question, answer) in turns.iter().tuples() {
                    records.push(QaRecord::new(*question, *answer));
                }
            }
        }
    }

    stats.records_emitted = records.len();
    debug!(
        "Prepared {} QA records from {} conversations ({} skipped, policy {})",
        stats.records_emitted, stats.conversations_seen, stats.conversations_skipped, policy
    );

    (records, stats)
}
