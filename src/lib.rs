//! Tracks how long you code and keeps the tally in a private GitHub repository.
//! A background daemon measures sessions and commits them periodically, the cli starts, stops
//! and inspects it.
//!

pub mod cli;
pub mod config;
pub mod daemon;
pub mod utils;
