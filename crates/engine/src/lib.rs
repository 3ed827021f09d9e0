//! The Contexta context engine.
//!
//! Builds a compact, token-budgeted context for an LLM call from three
//! layers:
//!
//! 1. **Domain** knowledge for the program being applied to
//! 2. **Entity memory**: a profile plus typed, confidence-scored facts,
//!    deduplicated and compressed into a few lines
//! 3. **Session** state: intent, active document and recent messages
//!
//! Components are constructed explicitly and shared by `Arc`; there is no
//! global state.

pub mod compression;
pub mod context;
pub mod domain;
pub mod entity_store;

pub use compression::{CompressionBreakdown, CompressionResult, compress, deduplicate, similarity};
pub use context::{
    AssembleOptions, AssembledContext, AssemblyMetadata, ContextAssembler, DropInfo, Layer,
    LayerStats, SessionContext, SessionManager, TokenBreakdown, to_prompt,
};
pub use domain::{DomainContext, DomainMatch, DomainRegistry};
pub use entity_store::{EntityMemoryStore, EntityUpdate};
