//! agentdesk is a console chat client for document Q&A, data-science help,
//! and open-ended research, plus the HTTP relay it streams replies through.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the chat session, the SSE frame decoder, prompt
//!   composition, uploaded documents, and streaming orchestration.
//! - [`relay`] is the axum endpoint that adds the system prompt and pipes the
//!   AI gateway's event stream back to clients.
//! - [`api`] defines the JSON payloads exchanged with the relay and gateway.
//! - [`utils`] holds URL, auth-header, and transcript-log helpers.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod relay;
pub mod utils;
