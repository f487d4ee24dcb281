//! Storage Driver Abstractions
//!
//! The core never talks to a store directly. It composes [`Pipeline`]s and
//! hands them to a [`StorageDriver`]; the in-memory driver is the reference
//! implementation.

pub mod core;
pub mod memory;
pub mod pipeline;

// Re-export core traits and types
pub use self::core::*;
pub use memory::{memory_driver, MemoryDriver};
pub use pipeline::{OrderDirection, Pipeline, Stage};
