//! One-shot note cards for a file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::generator::Generator;
use crate::parser::extract_json_array;
use crate::prompt::note_prompt;
use crate::sandbox::{Sandbox, SandboxError};

/// Maximum number of cards returned for one file.
pub const MAX_NOTES: usize = 5;

/// Title of the card returned when generation fails.
pub const UNAVAILABLE_TITLE: &str = "Unable to Generate Notes";

/// Body of the card returned when generation fails.
pub const UNAVAILABLE_CONTENT: &str =
    "AI note generation is currently unavailable. Please try again later.";

/// Title of the single card built from unstructured output.
pub const FALLBACK_TITLE: &str = "Notes";

/// A short titled summary of part of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteCard {
    /// Position in the batch, starting at 1
    pub id: u32,
    /// Card heading
    pub title: String,
    /// Card body
    pub content: String,
}

impl NoteCard {
    fn unavailable() -> Self {
        Self {
            id: 1,
            title: UNAVAILABLE_TITLE.to_string(),
            content: UNAVAILABLE_CONTENT.to_string(),
        }
    }
}

/// Read `file` through the sandbox and generate note cards for it.
///
/// Only reading the file can fail; a failed generation still yields the
/// single "unavailable" card.
pub async fn generate_notes(
    generator: &dyn Generator,
    sandbox: &Sandbox,
    file: &Path,
) -> Result<Vec<NoteCard>, SandboxError> {
    let text = sandbox.read_text_file(file).await?;
    Ok(notes_for_text(generator, file, &text).await)
}

/// Generate note cards for already-loaded text.
pub async fn notes_for_text(generator: &dyn Generator, file: &Path, text: &str) -> Vec<NoteCard> {
    let prompt = note_prompt(file, text);
    match generator.generate(&prompt).await {
        Ok(output) => parse_notes(&output.stdout),
        Err(e) => {
            tracing::warn!(file = %file.display(), error = %e, "note generation failed");
            vec![NoteCard::unavailable()]
        }
    }
}

/// Turn generator stdout into at most [`MAX_NOTES`] cards.
///
/// Objects without usable `content` are skipped. If nothing usable is found
/// the trimmed output becomes one card titled [`FALLBACK_TITLE`]; blank
/// output yields the "unavailable" card.
pub fn parse_notes(stdout: &str) -> Vec<NoteCard> {
    let cards: Vec<NoteCard> = extract_json_array(stdout)
        .unwrap_or_default()
        .into_iter()
        .filter_map(card_parts)
        .take(MAX_NOTES)
        .zip(1..)
        .map(|((title, content), id)| NoteCard { id, title, content })
        .collect();

    if !cards.is_empty() {
        return cards;
    }

    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return vec![NoteCard::unavailable()];
    }
    vec![NoteCard {
        id: 1,
        title: FALLBACK_TITLE.to_string(),
        content: trimmed.to_string(),
    }]
}

fn card_parts(object: Map<String, Value>) -> Option<(String, String)> {
    let content = match object.get("content")? {
        Value::String(s) if !s.trim().is_empty() => s.clone(),
        Value::String(_) | Value::Null => return None,
        other => other.to_string(),
    };
    let title = object
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(FALLBACK_TITLE)
        .to_string();
    Some((title, content))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::generator::{GenerationError, GenerationOutput};

    struct FixedGenerator(Result<&'static str, ()>);

    #[async_trait]
    impl Generator for FixedGenerator {
        async fn generate(&self, prompt: &str) -> Result<GenerationOutput, GenerationError> {
            assert!(prompt.contains("note cards"));
            match self.0 {
                Ok(stdout) => Ok(GenerationOutput {
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                }),
                Err(()) => Err(GenerationError::Exited {
                    code: Some(1),
                    stderr: "boom".to_string(),
                }),
            }
        }
    }

    // ==================== parse_notes Tests ====================

    #[test]
    fn test_parse_numbered_cards() {
        let cards = parse_notes(
            r#"Notes: [{"title":"Purpose","content":"Loads config"},{"title":"Types","content":"Config"}]"#,
        );

        assert_eq!(
            cards,
            vec![
                NoteCard {
                    id: 1,
                    title: "Purpose".to_string(),
                    content: "Loads config".to_string(),
                },
                NoteCard {
                    id: 2,
                    title: "Types".to_string(),
                    content: "Config".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_caps_at_five() {
        let items: Vec<_> = (1..=8)
            .map(|i| format!(r#"{{"title":"T{i}","content":"C{i}"}}"#))
            .collect();
        let cards = parse_notes(&format!("[{}]", items.join(",")));

        assert_eq!(cards.len(), MAX_NOTES);
        assert_eq!(cards[4].id, 5);
        assert_eq!(cards[4].title, "T5");
    }

    #[test]
    fn test_parse_skips_unusable_entries_without_id_gaps() {
        let cards = parse_notes(
            r#"[{"title":"Empty","content":""},{"content":"untitled"},{"title":"Nested","content":{"k":1}}]"#,
        );

        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].id, 1);
        assert_eq!(cards[0].title, FALLBACK_TITLE);
        assert_eq!(cards[1].id, 2);
        assert_eq!(cards[1].content, r#"{"k":1}"#);
    }

    #[test]
    fn test_parse_prose_becomes_single_card() {
        let cards = parse_notes("  This file defines the router.\n");

        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].title, "Notes");
        assert_eq!(cards[0].content, "This file defines the router.");
    }

    #[test]
    fn test_parse_blank_output_is_unavailable() {
        assert_eq!(parse_notes("   "), vec![NoteCard::unavailable()]);
    }

    // ==================== generate_notes Tests ====================

    #[tokio::test]
    async fn test_generation_failure_returns_unavailable_card() {
        let generator = FixedGenerator(Err(()));
        let cards = notes_for_text(&generator, Path::new("a.md"), "text").await;

        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].id, 1);
        assert_eq!(cards[0].title, "Unable to Generate Notes");
        assert_eq!(
            cards[0].content,
            "AI note generation is currently unavailable. Please try again later."
        );
    }

    #[tokio::test]
    async fn test_generate_notes_reads_through_sandbox() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("proj")).unwrap();
        std::fs::write(dir.path().join("proj/doc.md"), "# Doc").unwrap();
        let sandbox = Sandbox::new(dir.path());
        let file = sandbox.resolve_file("proj", "doc.md").await.unwrap();

        let generator = FixedGenerator(Ok(r#"[{"title":"Heading","content":"Just a heading"}]"#));
        let cards = generate_notes(&generator, &sandbox, &file).await.unwrap();

        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].title, "Heading");
    }

    #[tokio::test]
    async fn test_generate_notes_rejects_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("proj/sub")).unwrap();
        let sandbox = Sandbox::new(dir.path());
        let path = sandbox.resolve_file("proj", "sub").await.unwrap();

        let generator = FixedGenerator(Ok("[]"));
        let result = generate_notes(&generator, &sandbox, &path).await;
        assert!(matches!(result, Err(SandboxError::NotAFile(_))));
    }
}
