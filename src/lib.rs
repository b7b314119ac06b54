//! Recall - persistent memory for AI coding assistants.
//!
//! Captures tool-use observations, session summaries, and user prompts,
//! stores them in SQLite with full-text and vector indices, and serves
//! hybrid (semantic + metadata) search and timeline reconstruction back
//! to the assistant over HTTP.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
