//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use margin::{GeneratorConfig, PromptInput, StreamLimits};

/// Server settings
#[derive(Args, Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "MARGIN_ADDR", default_value = "127.0.0.1:3001")]
    pub addr: SocketAddr,

    /// Directory holding one subdirectory per project
    #[arg(long, env = "MARGIN_PROJECTS_DIR", default_value = "./projects")]
    pub projects_dir: PathBuf,

    /// Origins allowed to call the API from a browser
    #[arg(
        long = "allowed-origin",
        env = "MARGIN_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    #[command(flatten)]
    #[allow(missing_docs)]
    pub generator: GeneratorArgs,

    #[command(flatten)]
    #[allow(missing_docs)]
    pub stream: StreamArgs,
}

/// Settings for the external generation command
#[derive(Args, Debug, Clone)]
pub struct GeneratorArgs {
    /// Program invoked for every generation
    #[arg(long = "generator", env = "MARGIN_GENERATOR", default_value = "claude")]
    pub program: String,

    /// Argument passed to the generator before the prompt (repeatable)
    #[arg(
        long = "generator-arg",
        env = "MARGIN_GENERATOR_ARGS",
        value_delimiter = ' ',
        allow_hyphen_values = true,
        default_value = "-p"
    )]
    pub args: Vec<String>,

    /// How the prompt is delivered: `arg` or `stdin`
    #[arg(
        long,
        env = "MARGIN_PROMPT_INPUT",
        default_value = "arg",
        value_parser = parse_prompt_input
    )]
    pub prompt_input: PromptInput,

    /// Maximum bytes captured from the generator's stdout or stderr
    #[arg(long, env = "MARGIN_MAX_OUTPUT_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_output_bytes: usize,

    /// Timeout for one generation, in seconds
    #[arg(long, env = "MARGIN_GENERATOR_TIMEOUT", default_value_t = 120)]
    pub timeout_secs: u64,
}

impl GeneratorArgs {
    /// Library configuration for these arguments.
    pub fn to_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            program: self.program.clone(),
            args: self.args.clone(),
            prompt_input: self.prompt_input,
            max_output_bytes: self.max_output_bytes,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Pacing and bounds of thought streams
#[derive(Args, Debug, Clone)]
pub struct StreamArgs {
    /// Generation rounds per stream
    #[arg(long, env = "MARGIN_MAX_ITERATIONS", default_value_t = 10)]
    pub max_iterations: u32,

    /// Pause between thoughts of one batch, in milliseconds
    #[arg(long, env = "MARGIN_THOUGHT_DELAY_MS", default_value_t = 500)]
    pub thought_delay_ms: u64,

    /// Pause between iterations, in milliseconds
    #[arg(long, env = "MARGIN_ITERATION_DELAY_MS", default_value_t = 2000)]
    pub iteration_delay_ms: u64,
}

impl StreamArgs {
    /// Library limits for these arguments.
    pub fn to_limits(&self) -> StreamLimits {
        StreamLimits {
            max_iterations: self.max_iterations,
            thought_delay: Duration::from_millis(self.thought_delay_ms),
            iteration_delay: Duration::from_millis(self.iteration_delay_ms),
            ..StreamLimits::default()
        }
    }
}

fn parse_prompt_input(s: &str) -> Result<PromptInput, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "arg" => Ok(PromptInput::Arg),
        "stdin" => Ok(PromptInput::Stdin),
        other => Err(format!("expected `arg` or `stdin`, got `{other}`")),
    }
}
