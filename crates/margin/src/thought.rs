//! Thoughts and per-session thought history

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Type tag of a thought
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThoughtKind {
    /// Observation about the document
    Analysis,
    /// Proposed change or idea
    Suggestion,
    /// Open question raised by the document
    Question,
}

impl ThoughtKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Suggestion => "suggestion",
            Self::Question => "question",
        }
    }

    /// Parse a wire name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "analysis" => Some(Self::Analysis),
            "suggestion" => Some(Self::Suggestion),
            "question" => Some(Self::Question),
            _ => None,
        }
    }
}

impl fmt::Display for ThoughtKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A thought as extracted from generator output, before it is numbered.
///
/// Fields are passed through as found; [`RawThought::normalize`] applies the
/// defaulting policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RawThought {
    /// The `type` field, if it was a string
    pub kind: Option<String>,
    /// The `content` field, any JSON value
    pub content: Option<Value>,
    /// The whole object, kept for rendering entries with no `content`
    pub source: Map<String, Value>,
}

impl RawThought {
    /// Build a raw thought from a parsed JSON object.
    pub fn from_object(source: Map<String, Value>) -> Self {
        Self {
            kind: source
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_string),
            content: source.get("content").cloned(),
            source,
        }
    }

    /// Build a raw thought with a known kind and text content.
    pub fn new(kind: ThoughtKind, content: impl Into<String>) -> Self {
        let content = Value::String(content.into());
        let mut source = Map::new();
        source.insert("type".to_string(), Value::String(kind.as_str().to_string()));
        source.insert("content".to_string(), content.clone());
        Self {
            kind: Some(kind.as_str().to_string()),
            content: Some(content),
            source,
        }
    }

    /// Resolve this entry into a kind and text.
    ///
    /// Unknown or missing kinds become [`ThoughtKind::Analysis`]. String
    /// content is used verbatim, other JSON values are rendered compactly, and
    /// a missing `content` renders the whole entry.
    pub fn normalize(self) -> HistoryEntry {
        let kind = self
            .kind
            .as_deref()
            .and_then(ThoughtKind::parse)
            .unwrap_or(ThoughtKind::Analysis);

        let content = match self.content {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => Value::Object(self.source).to_string(),
        };

        HistoryEntry { kind, content }
    }
}

/// The `{type, content}` base of an emitted thought, as kept in history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Thought type
    #[serde(rename = "type")]
    pub kind: ThoughtKind,
    /// Thought text
    pub content: String,
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.content)
    }
}

/// An emitted thought
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    /// Session-wide sequence number, starting at 1
    pub id: u64,
    /// Thought type
    #[serde(rename = "type")]
    pub kind: ThoughtKind,
    /// Thought text
    pub content: String,
    /// When the thought was emitted
    pub timestamp: DateTime<Utc>,
    /// Iteration that produced the thought, starting at 1
    pub iteration: u32,
}

/// Append-only history of one stream session
#[derive(Debug, Clone, Default)]
pub struct ThoughtHistory {
    entries: Vec<HistoryEntry>,
}

impl ThoughtHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    /// The most recent `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> &[HistoryEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been emitted yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
