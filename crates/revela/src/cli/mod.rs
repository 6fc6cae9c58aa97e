//! Command implementations.

pub mod analyze;
pub mod config;
pub mod export;
pub mod preview;
mod progress;
mod recipe;
mod roll;
