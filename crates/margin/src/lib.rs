//! Margin: iterative AI thoughts about files in a project tree
//!
//! Margin resolves files inside a sandboxed projects directory and streams a
//! bounded series of AI-generated thoughts (analyses, suggestions and
//! questions) about them, each iteration building on the last few thoughts.
//! It can also summarize a file as a short batch of note cards.
//!
//! The AI itself is an external command behind the [`Generator`] trait; the
//! streaming loop only sees prompts going in and text coming out.

mod generator;
mod limits;
mod notes;
mod parser;
mod prompt;
mod sandbox;
mod stream;
mod thought;

pub use generator::{
    CommandGenerator, GenerationError, GenerationOutput, Generator, GeneratorConfig, PromptInput,
};
pub use limits::StreamLimits;
pub use notes::{MAX_NOTES, NoteCard, generate_notes, notes_for_text, parse_notes};
pub use parser::{EMPTY_OUTPUT_FALLBACK, extract_json_array, parse_thoughts};
pub use prompt::{note_prompt, thought_prompt};
pub use sandbox::{
    DEFAULT_PREVIEW_LIMIT, FileStat, NodeKind, Sandbox, SandboxError, TreeNode, resolve_within,
};
pub use stream::{GENERATION_STOPPED, SessionState, StreamEvent, StreamSession, ThoughtStream};
pub use thought::{HistoryEntry, RawThought, Thought, ThoughtHistory, ThoughtKind};
