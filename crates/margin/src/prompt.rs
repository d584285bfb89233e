//! Prompt construction for thought iterations and note batches.
//!
//! Prompts are pure functions of their inputs: the same path and history tail
//! always produce the same text.

use std::path::Path;

use crate::thought::HistoryEntry;

/// Maximum bytes of file content embedded in a note prompt.
pub const NOTE_CONTENT_LIMIT: usize = 48 * 1024;

const RESPONSE_EXAMPLE: &str = r#"[
  {"type": "analysis", "content": "The loader re-reads the config file on every request."},
  {"type": "suggestion", "content": "Cache the parsed config and invalidate it on change."},
  {"type": "question", "content": "Is the config expected to change while the server runs?"}
]"#;

const NOTE_EXAMPLE: &str = r#"[
  {"title": "Purpose", "content": "Loads and validates the service configuration."},
  {"title": "Key types", "content": "Config, Source and the Validate trait."}
]"#;

/// Build the prompt for the next thought iteration.
///
/// The first iteration asks for one thought of each type about the document.
/// Later iterations show the last `window` history entries and ask for three
/// new thoughts that go deeper.
pub fn thought_prompt(path: &Path, recent: &[HistoryEntry]) -> String {
    let path = path.display();

    if recent.is_empty() {
        return format!(
            "You are reading the document at {path}.\n\
             Share exactly 3 thoughts about it: one analysis, one suggestion and one question.\n\
             Respond with only a JSON array of objects with \"type\" and \"content\" fields, \
             where \"type\" is one of \"analysis\", \"suggestion\" or \"question\".\n\
             Example:\n{RESPONSE_EXAMPLE}"
        );
    }

    let excerpt = recent
        .iter()
        .map(HistoryEntry::to_string)
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are still reading the document at {path}.\n\
         Your most recent thoughts were:\n{excerpt}\n\n\
         Share 3 new, deeper thoughts that build on, diverge from, or follow up on these: \
         one analysis, one suggestion and one question. Do not repeat earlier thoughts.\n\
         Respond with only a JSON array of objects with \"type\" and \"content\" fields, \
         where \"type\" is one of \"analysis\", \"suggestion\" or \"question\".\n\
         Example:\n{RESPONSE_EXAMPLE}"
    )
}

/// Build the prompt for a batch of note cards about `content`.
pub fn note_prompt(path: &Path, content: &str) -> String {
    let path = path.display();
    let (content, truncated) = truncate_at_char_boundary(content, NOTE_CONTENT_LIMIT);
    let marker = if truncated {
        "\n[content truncated]"
    } else {
        ""
    };

    format!(
        "Summarize the document at {path} as 3 to 5 short note cards.\n\
         Respond with only a JSON array of objects with \"title\" and \"content\" fields.\n\
         Example:\n{NOTE_EXAMPLE}\n\n\
         Document:\n{content}{marker}"
    )
}

fn truncate_at_char_boundary(s: &str, limit: usize) -> (&str, bool) {
    if s.len() <= limit {
        return (s, false);
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    (&s[..end], true)
}
