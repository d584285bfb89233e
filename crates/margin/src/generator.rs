//! External generation process.
//!
//! The controller only depends on the [`Generator`] trait, so tests and
//! embedders can swap in their own implementation. [`CommandGenerator`] is the
//! production implementation: it spawns a configured command per call and
//! captures its output.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};

use crate::limits::{CaptureBuffer, duration_ms};

/// Errors from invoking the generation process
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The process could not be started
    #[error("failed to start generator `{program}`: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying spawn error
        #[source]
        source: io::Error,
    },
    /// The process exited unsuccessfully
    #[error("generator exited with code {code:?}: {stderr}")]
    Exited {
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
        /// Captured stderr, trimmed
        stderr: String,
    },
    /// stdout or stderr exceeded the capture limit
    #[error("generator output exceeded {limit} bytes")]
    OutputLimit {
        /// Configured limit in bytes
        limit: usize,
    },
    /// The process ran longer than the configured timeout
    #[error("generator timed out after {0:?}")]
    Timeout(Duration),
    /// IO error while talking to the process
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Captured output of a successful generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error (informational only)
    pub stderr: String,
}

/// Something that turns a prompt into text.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Run one generation. Each call is independent.
    async fn generate(&self, prompt: &str) -> Result<GenerationOutput, GenerationError>;
}

/// How the prompt reaches the generation process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptInput {
    /// Appended as the final command-line argument
    #[default]
    Arg,
    /// Written to the process's stdin
    Stdin,
}

/// Configuration for [`CommandGenerator`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Program to run
    pub program: String,
    /// Arguments placed before the prompt
    pub args: Vec<String>,
    /// How the prompt is delivered
    pub prompt_input: PromptInput,
    /// Maximum bytes captured from each of stdout and stderr
    pub max_output_bytes: usize,
    /// Wall-clock timeout for a single call
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: vec!["-p".to_string()],
            prompt_input: PromptInput::Arg,
            max_output_bytes: 10 * 1024 * 1024, // 10 MB
            timeout: Duration::from_secs(120),
        }
    }
}

/// Runs an external command for every generation.
///
/// The prompt is passed as a single argv element (no shell is involved, so
/// it needs no quoting) or on stdin. The child is killed if the call times
/// out, overflows the capture limit, or is dropped mid-flight.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    config: GeneratorConfig,
}

impl CommandGenerator {
    /// Create a generator from its configuration.
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn command(&self, prompt: &str) -> Command {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match self.config.prompt_input {
            PromptInput::Arg => {
                command.arg(prompt).stdin(Stdio::null());
            }
            PromptInput::Stdin => {
                command.stdin(Stdio::piped());
            }
        }
        command
    }

    async fn capture(
        &self,
        child: &mut Child,
        prompt: &str,
    ) -> Result<GenerationOutput, GenerationError> {
        let limit = self.config.max_output_bytes;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr not captured"))?;
        let stdin = child.stdin.take();

        // Read both pipes while feeding stdin so a chatty child cannot block
        let (stdout, stderr, ()) = tokio::try_join!(
            read_limited(stdout, limit),
            read_limited(stderr, limit),
            write_prompt(stdin, prompt)
        )?;

        let status = child.wait().await?;
        let stderr = stderr.into_string();
        if !status.success() {
            return Err(GenerationError::Exited {
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        if !stderr.trim().is_empty() {
            tracing::warn!(stderr = %stderr.trim(), "generator wrote to stderr");
        }

        Ok(GenerationOutput {
            stdout: stdout.into_string(),
            stderr,
        })
    }
}

#[async_trait]
impl Generator for CommandGenerator {
    async fn generate(&self, prompt: &str) -> Result<GenerationOutput, GenerationError> {
        tracing::debug!(
            program = %self.config.program,
            prompt_bytes = prompt.len(),
            "invoking generator"
        );

        let mut child = self
            .command(prompt)
            .spawn()
            .map_err(|source| GenerationError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        let outcome =
            tokio::time::timeout(self.config.timeout, self.capture(&mut child, prompt)).await;

        match outcome {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => {
                let _ = child.start_kill();
                Err(e)
            }
            Err(_) => {
                let _ = child.start_kill();
                Err(GenerationError::Timeout(self.config.timeout))
            }
        }
    }
}

async fn read_limited<R>(mut reader: R, limit: usize) -> Result<CaptureBuffer, GenerationError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = CaptureBuffer::new(limit);
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(buffer);
        }
        buffer.push(&chunk[..n]);
        if buffer.overflowed() {
            return Err(GenerationError::OutputLimit { limit });
        }
    }
}

async fn write_prompt(stdin: Option<ChildStdin>, prompt: &str) -> Result<(), GenerationError> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };

    match stdin.write_all(prompt.as_bytes()).await {
        Ok(()) => {}
        // The child may exit without reading its input
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
        Err(e) => return Err(e.into()),
    }
    drop(stdin);
    Ok(())
}
