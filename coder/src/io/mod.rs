//! I/O adapters for the agent loop.

pub mod config;
pub mod context;
pub mod model;
pub mod process;
pub mod prompt;
pub mod transcript;
pub mod workspace;
