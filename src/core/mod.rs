pub mod chat_stream;
pub mod config;
pub mod documents;
pub mod prompt;
pub mod session;
pub mod sse;
pub mod steps;
