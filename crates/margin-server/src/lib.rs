//! Margin HTTP Server
//!
//! Serves the projects directory and Margin's AI output to a browser client.
//! Thought streams are delivered as server-sent events, one JSON event per
//! `data:` line:
//!
//! ```text
//! Client                                        Server
//! │                                               │
//! │  GET /api/projects/p/thoughts/stream?path=f   │
//! │ ─────────────────────────────────────────────>│
//! │                                               │
//! │     data: {"thought": {"id": 1, ...}}         │
//! │<───────────────────────────────────────────── │
//! │     data: {"thought": {"id": 2, ...}}         │
//! │<───────────────────────────────────────────── │
//! │                    ...                        │
//! │     data: {"done": true}                      │
//! │<───────────────────────────────────────────── │
//! ```
//!
//! Closing the connection cancels the session; no further generations are
//! started for it.

mod config;
mod error;
mod routes;
mod server;

pub use config::{GeneratorArgs, ServerConfig, StreamArgs};
pub use error::{ApiError, ServerError};
pub use routes::{AppState, FilePreview, KEEP_ALIVE_INTERVAL, NotesResponse, app, router};
pub use server::ThoughtServer;
