//! # Contexta Core
//!
//! Domain types, traits, and error definitions for the Contexta context
//! engine. Nothing in here performs I/O — backends and the engine live in
//! their own crates and depend inward on this one.
//!
//! ## Contents
//!
//! - Facts, entity profiles and memory blocks
//! - The [`BlockStore`] persistence trait
//! - Learning events from external workflows
//! - Session message types
//! - A [`Clock`] abstraction for TTL and expiry

pub mod clock;
pub mod error;
pub mod event;
pub mod fact;
pub mod memory;
pub mod message;
pub mod profile;

// Re-export key types at crate root for ergonomics
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, ResourceKind, Result, StoreError};
pub use event::{LearningEvent, Outcome};
pub use fact::{Fact, FactInput, FactSource, FactType};
pub use memory::{BlockStore, CompressionStats, EntityMemoryBlock};
pub use message::{ActiveDocument, Message, Role};
pub use profile::{ApplicationHistory, EntityProfile};
