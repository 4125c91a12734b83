//! ytdl - download orchestration over yt-dlp
//!
//! Builds yt-dlp invocations, supervises the child process, turns its
//! output into structured progress, and sequences downloads in single-shot,
//! queue, and interactive sessions.

pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod session;
pub mod sink;
