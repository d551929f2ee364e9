
use anyhow::{Context, Result};
use clap::ValueEnum;
use itertools::Itertools;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{Conversation, QaRecord};

/// Shape of a raw transcript file, decided once when it is ingested
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TranscriptFormat {
    /// JSON: `{"conversations": [[...], ...]}` or `[{"dialogue_id", "turns": [...]}]`
    Dialogues,
    /// Plain text, non-blank lines taken pairwise as question then answer
    QaLines,
    /// Plain text, one utterance per line, the whole file a single conversation
    DialogueLines,
}

impl TranscriptFormat {
    /// Guess the format from a file extension. Plain text is ambiguous and must be named.
    #[inline]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Some(Self::Dialogues),
            _ => None,
        }
    }
}

// Entries stay untyped here so one malformed conversation does not reject the file
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DialogueFile {
    Flat { conversations: Vec<Value> },
    Structured(Vec<Value>),
}

// Speaker labels are ignored: speakers alternate, so turn order is authoritative
#[derive(Debug, Deserialize)]
struct StructuredDialogue {
    turns: Vec<StructuredTurn>,
}

#[derive(Debug, Deserialize)]
struct StructuredTurn {
    text: String,
}

/// Load conversations from a transcript file of the given shape
#[inline]
pub fn load_conversations(path: &Path, format: TranscriptFormat) -> Result<Vec<Conversation>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript file: {}", path.display()))?;

    let conversations = parse_conversations(&content, format)
        .with_context(|| format!("Failed to parse transcript file: {}", path.display()))?;

    info!(
        "Loaded {} conversations from {} ({:?})",
        conversations.len(),
        path.display(),
        format
    );
    Ok(conversations)
}

/// Parse transcript text of the given shape into conversations
#[inline]
pub fn parse_conversations(content: &str, format: TranscriptFormat) -> Result<Vec<Conversation>> {
    match format {
        TranscriptFormat::Dialogues => parse_dialogues_json(content),
        TranscriptFormat::QaLines => Ok(parse_qa_lines(content)),
        TranscriptFormat::DialogueLines => Ok(parse_dialogue_lines(content)),
    }
}

fn parse_dialogues_json(content: &str) -> Result<Vec<Conversation>> {
    let file: DialogueFile =
        serde_json::from_str(content).context("Transcript JSON has an unrecognised shape")?;

    Ok(match file {
        DialogueFile::Flat { conversations } => keep_well_formed(conversations, flat_conversation),
        DialogueFile::Structured(dialogues) => {
            keep_well_formed(dialogues, structured_conversation)
        }
    })
}

fn keep_well_formed<F>(entries: Vec<Value>, parse: F) -> Vec<Conversation>
where
    F: Fn(Value) -> Option<Conversation>,
{
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(position, entry)| {
            let conversation = parse(entry);
            if conversation.is_none() {
                warn!("Skipping malformed conversation at position {}", position);
            }
            conversation
        })
        .collect()
}

/// A list of utterance strings
fn flat_conversation(entry: Value) -> Option<Conversation> {
    serde_json::from_value(entry).ok()
}

/// A `{"turns": [{"text": ...}, ...]}` object
fn structured_conversation(entry: Value) -> Option<Conversation> {
    let dialogue: StructuredDialogue = serde_json::from_value(entry).ok()?;
    Some(
        dialogue
            .turns
            .into_iter()
            .map(|turn| strip_quotes(&turn.text).to_string())
            .collect(),
    )
}

fn parse_qa_lines(content: &str) -> Vec<Conversation> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .tuples()
        .map(|(question, answer)| vec![question.to_string(), answer.to_string()])
        .collect()
}

fn parse_dialogue_lines(content: &str) -> Vec<Conversation> {
    let turns: Conversation = content
        .lines()
        .map(strip_quotes)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if turns.is_empty() {
        Vec::new()
    } else {
        vec![turns]
    }
}

/// Trim surrounding double quotes and spaces, as spreadsheet exports leave them
fn strip_quotes(text: &str) -> &str {
    text.trim_matches(|c: char| c == '"' || c.is_whitespace())
}

/// Write a QA table as CSV with a `question,answer` header
#[inline]
pub fn save_qa_csv(path: &Path, records: &[QaRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    for record in records {
        writer
            .serialize(record)
            .context("Failed to write QA row")?;
    }

    writer.flush().context("Failed to flush QA table")?;
    debug!("Wrote {} QA rows to {}", records.len(), path.display());
    Ok(())
}

/// Read a QA table written by [`save_qa_csv`], preserving row order
#[inline]
pub fn load_qa_csv(path: &Path) -> Result<Vec<QaRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut records = Vec::new();
    for (line, row) in reader.deserialize::<QaRecord>().enumerate() {
        let row = row.with_context(|| format!("Malformed QA row {}", line + 1))?;
        let question = row.question.trim();
        let answer = row.answer.trim();
        if question.is_empty() || answer.is_empty() {
            debug!("Skipping QA row {} with an empty field", line + 1);
            continue;
        }
        records.push(QaRecord::new(question, answer));
    }

    Ok(records)
}
