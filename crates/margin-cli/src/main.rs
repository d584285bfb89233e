//! Margin CLI - run thought streams and notes from a terminal
//!
//! Usage:
//!   margin projects                     List projects
//!   margin thoughts <project> <path>    Stream thoughts as JSON lines
//!   margin notes <project> <path>       Print note cards as JSON

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use margin::{CommandGenerator, Generator, Sandbox, SessionState, ThoughtStream, generate_notes};
use margin_server::{GeneratorArgs, NotesResponse, StreamArgs};

/// Margin - AI margin notes for project files
#[derive(Parser, Debug)]
#[command(name = "margin")]
#[command(about = "Stream AI thoughts about project files")]
struct Cli {
    /// Directory holding one subdirectory per project
    #[arg(long, env = "MARGIN_PROJECTS_DIR", default_value = "./projects")]
    projects_dir: PathBuf,

    #[command(flatten)]
    generator: GeneratorArgs,

    #[command(flatten)]
    stream: StreamArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List projects
    Projects,
    /// Stream thoughts about a file, one JSON event per line
    Thoughts {
        /// Project name
        project: String,
        /// Path relative to the project
        path: String,
    },
    /// Generate note cards for a file
    Notes {
        /// Project name
        project: String,
        /// Path relative to the project
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let cli = Cli::parse();
    let sandbox = Sandbox::new(&cli.projects_dir);
    let generator: Arc<dyn Generator> = Arc::new(CommandGenerator::new(cli.generator.to_config()));

    match cli.command {
        Command::Projects => {
            for project in sandbox.list_projects().await? {
                println!("{project}");
            }
        }
        Command::Thoughts { project, path } => {
            let file = sandbox
                .resolve_regular_file(&project, &path)
                .await
                .with_context(|| format!("cannot open {project}/{path}"))?;
            let stream = ThoughtStream::new(generator, cli.stream.to_limits());
            let state = print_thoughts(&stream, file).await?;
            if state == SessionState::Aborted {
                std::process::exit(1);
            }
        }
        Command::Notes { project, path } => {
            let file = sandbox
                .resolve_file(&project, &path)
                .await
                .with_context(|| format!("cannot open {project}/{path}"))?;
            let notes = generate_notes(generator.as_ref(), &sandbox, &file).await?;
            let body = serde_json::to_string_pretty(&NotesResponse { notes })?;
            println!("{body}");
        }
    }

    Ok(())
}

/// Print events until the session ends or Ctrl+C closes the receiver.
async fn print_thoughts(stream: &ThoughtStream, file: PathBuf) -> anyhow::Result<SessionState> {
    let (mut rx, session) = stream.spawn(file);
    let mut stdout = io::stdout();

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                serde_json::to_writer(&mut stdout, &event)?;
                writeln!(stdout)?;
                stdout.flush()?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted, stopping stream");
                break;
            }
        }
    }

    drop(rx);
    Ok(session.await?)
}
