//! Vigil daemon library - exposes modules for testing.

pub mod config;
pub mod scheduler;
pub mod triggers;
