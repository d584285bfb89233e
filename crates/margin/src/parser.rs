//! Extraction of structured thoughts from free-form generator output.
//!
//! Generators are asked for a JSON array but routinely wrap it in prose or
//! code fences. The parser takes the widest bracketed span in the text, from
//! the first `[` to the last `]`, and tries to read it as an array of
//! objects. Anything else collapses into a single fallback thought, so
//! parsing never fails.

use serde_json::{Map, Value};

use crate::thought::{RawThought, ThoughtKind};

/// Content of the fallback thought when the generator printed nothing.
pub const EMPTY_OUTPUT_FALLBACK: &str = "Continuing analysis...";

/// The widest `[...]` span in `text`, if any.
///
/// This is deliberately greedy: prose containing a `]` after the real array
/// widens the span and usually makes it unparseable.
pub fn bracketed_span(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

/// Extract the JSON array of objects embedded in `text`.
///
/// Returns `None` when there is no bracketed span or it is not an array of
/// objects.
pub fn extract_json_array(text: &str) -> Option<Vec<Map<String, Value>>> {
    let span = bracketed_span(text)?;
    match serde_json::from_str::<Vec<Map<String, Value>>>(span) {
        Ok(objects) => Some(objects),
        Err(e) => {
            tracing::debug!(error = %e, "bracketed span is not a JSON array of objects");
            None
        }
    }
}

/// Parse generator stdout into raw thoughts.
///
/// Always returns at least one entry: an empty or unparseable response yields
/// a single `analysis` thought carrying the trimmed text, or
/// [`EMPTY_OUTPUT_FALLBACK`] if the text is blank.
pub fn parse_thoughts(stdout: &str) -> Vec<RawThought> {
    match extract_json_array(stdout) {
        Some(objects) if !objects.is_empty() => {
            objects.into_iter().map(RawThought::from_object).collect()
        }
        _ => vec![fallback(stdout)],
    }
}

fn fallback(stdout: &str) -> RawThought {
    let trimmed = stdout.trim();
    let content = if trimmed.is_empty() {
        EMPTY_OUTPUT_FALLBACK
    } else {
        trimmed
    };
    RawThought::new(ThoughtKind::Analysis, content)
}
