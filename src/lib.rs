//! Event-sourced learning state: an append-only log of learner events,
//! pure read-model projections over it, a guarded PDCA reducer, versioned
//! lesson content, and a staged lesson compiler.

pub mod app;
pub mod cli;
pub mod commands;
pub mod compiler;
pub mod config;
pub mod content;
pub mod error;
pub mod events;
pub mod logging;
pub mod pdca;
pub mod projections;
pub mod storage;

pub use error::{Error, Result};
