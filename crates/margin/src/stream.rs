//! Iterative thought streams.
//!
//! A [`StreamSession`] repeatedly asks the [`Generator`] for thoughts about a
//! file, numbers them, and pushes them to a bounded channel:
//!
//! ```text
//! Idle ──> Streaming ──┬──> Completed     (iteration cap reached, {done})
//!                      ├──> Aborted       (generation failed, {error, done})
//!                      └──> Disconnected  (receiver dropped)
//! ```
//!
//! Each iteration builds a prompt from the tail of the history, runs one
//! generation, parses the output and emits every entry in order with a short
//! pause between them, then pauses longer before the next iteration.
//!
//! The receiver side going away is the cancellation signal. It is raced
//! against every suspension point (generation, each send, both pauses), so a
//! disconnected client never causes another generation to start and an
//! in-flight one is abandoned without its output being emitted.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::generator::{GenerationError, GenerationOutput, Generator};
use crate::limits::StreamLimits;
use crate::parser::parse_thoughts;
use crate::prompt::thought_prompt;
use crate::thought::{Thought, ThoughtHistory};

/// Error message sent when a generation fails mid-stream.
pub const GENERATION_STOPPED: &str = "Generation stopped";

/// An event pushed to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamEvent {
    /// A newly generated thought
    Thought {
        /// The thought
        thought: Thought,
    },
    /// Abnormal termination
    Error {
        /// Human-readable reason
        error: String,
        /// Always `true`
        done: bool,
    },
    /// Normal completion
    Done {
        /// Always `true`
        done: bool,
    },
}

impl StreamEvent {
    /// Wrap a thought.
    pub fn thought(thought: Thought) -> Self {
        Self::Thought { thought }
    }

    /// Normal completion marker.
    pub fn done() -> Self {
        Self::Done { done: true }
    }

    /// Terminal error.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
            done: true,
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Thought { .. })
    }
}

/// Lifecycle state of a stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created, loop not started
    Idle,
    /// Loop running
    Streaming,
    /// All iterations emitted, `{done}` sent
    Completed,
    /// Generation failed, `{error, done}` sent
    Aborted,
    /// The receiver went away
    Disconnected,
}

impl SessionState {
    /// Whether the session has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Disconnected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Why the loop stopped early.
enum Stop {
    Disconnected,
    Aborted(GenerationError),
}

/// Factory for stream sessions sharing one generator and one set of limits.
///
/// Sessions share nothing mutable: every call to [`ThoughtStream::spawn`]
/// gets its own history and counters.
#[derive(Clone)]
pub struct ThoughtStream {
    generator: Arc<dyn Generator>,
    limits: StreamLimits,
}

impl fmt::Debug for ThoughtStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThoughtStream")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl ThoughtStream {
    /// Create a stream factory.
    pub fn new(generator: Arc<dyn Generator>, limits: StreamLimits) -> Self {
        Self { generator, limits }
    }

    /// The limits applied to each session.
    pub fn limits(&self) -> &StreamLimits {
        &self.limits
    }

    /// The shared generator.
    pub fn generator(&self) -> Arc<dyn Generator> {
        Arc::clone(&self.generator)
    }

    /// Create a session for an already-resolved file, plus its receiver.
    pub fn session(&self, file: PathBuf) -> (StreamSession, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(self.limits.channel_capacity.max(1));
        let session = StreamSession::new(file, self.generator(), self.limits.clone(), tx);
        (session, rx)
    }

    /// Run a session for `file` on its own task.
    ///
    /// Dropping the receiver cancels the session. The handle resolves to the
    /// terminal state.
    pub fn spawn(&self, file: PathBuf) -> (mpsc::Receiver<StreamEvent>, JoinHandle<SessionState>) {
        let (session, rx) = self.session(file);
        let handle = tokio::spawn(session.run());
        (rx, handle)
    }
}

/// State of one open thought stream.
pub struct StreamSession {
    file: PathBuf,
    generator: Arc<dyn Generator>,
    limits: StreamLimits,
    tx: mpsc::Sender<StreamEvent>,
    history: ThoughtHistory,
    iteration: u32,
    next_id: u64,
    state: SessionState,
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("file", &self.file)
            .field("iteration", &self.iteration)
            .field("next_id", &self.next_id)
            .field("history_len", &self.history.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl StreamSession {
    /// Create an idle session writing to `tx`.
    pub fn new(
        file: PathBuf,
        generator: Arc<dyn Generator>,
        limits: StreamLimits,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Self {
        Self {
            file,
            generator,
            limits,
            tx,
            history: ThoughtHistory::new(),
            iteration: 0,
            next_id: 1,
            state: SessionState::Idle,
        }
    }

    /// The file being streamed.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion and return its terminal state.
    pub async fn run(mut self) -> SessionState {
        self.state = SessionState::Streaming;
        tracing::info!(file = %self.file.display(), "thought stream started");

        self.state = match self.drive().await {
            Ok(()) => SessionState::Completed,
            Err(Stop::Disconnected) => SessionState::Disconnected,
            Err(Stop::Aborted(e)) => {
                tracing::warn!(
                    file = %self.file.display(),
                    iteration = self.iteration,
                    error = %e,
                    "generation failed, stopping stream"
                );
                match self.send(StreamEvent::error(GENERATION_STOPPED)).await {
                    Ok(()) => SessionState::Aborted,
                    Err(_) => SessionState::Disconnected,
                }
            }
        };

        tracing::info!(
            file = %self.file.display(),
            state = %self.state,
            iterations = self.iteration,
            thoughts = self.next_id - 1,
            "thought stream finished"
        );
        self.state
    }

    async fn drive(&mut self) -> Result<(), Stop> {
        let max = self.limits.max_iterations;
        for iteration in 1..=max {
            self.iteration = iteration;
            self.run_iteration().await?;

            if iteration < max {
                self.pause(self.limits.iteration_delay).await?;
            }
        }
        self.send(StreamEvent::done()).await
    }

    async fn run_iteration(&mut self) -> Result<(), Stop> {
        let prompt = thought_prompt(&self.file, self.history.tail(self.limits.history_window));
        let output = self.generate(&prompt).await?;

        let batch = parse_thoughts(&output.stdout);
        tracing::debug!(
            iteration = self.iteration,
            batch = batch.len(),
            "emitting thought batch"
        );

        for raw in batch {
            let entry = raw.normalize();
            let thought = Thought {
                id: self.next_id,
                kind: entry.kind,
                content: entry.content.clone(),
                timestamp: Utc::now(),
                iteration: self.iteration,
            };
            self.next_id += 1;
            self.history.push(entry);

            self.send(StreamEvent::thought(thought)).await?;
            self.pause(self.limits.thought_delay).await?;
        }
        Ok(())
    }

    async fn generate(&self, prompt: &str) -> Result<GenerationOutput, Stop> {
        tokio::select! {
            biased;
            _ = self.tx.closed() => Err(Stop::Disconnected),
            result = self.generator.generate(prompt) => result.map_err(Stop::Aborted),
        }
    }

    async fn send(&self, event: StreamEvent) -> Result<(), Stop> {
        self.tx.send(event).await.map_err(|_| Stop::Disconnected)
    }

    async fn pause(&self, duration: Duration) -> Result<(), Stop> {
        if duration.is_zero() {
            return if self.tx.is_closed() {
                Err(Stop::Disconnected)
            } else {
                Ok(())
            };
        }

        tokio::select! {
            biased;
            _ = self.tx.closed() => Err(Stop::Disconnected),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
