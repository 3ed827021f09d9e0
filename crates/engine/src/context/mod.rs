//! Context layers and their assembly under a token budget.
//!
//! | Layer | Source | Trim Strategy |
//! |-------|--------|---------------|
//! | 1. Domain | `DomainRegistry` | Trailing knowledge lines dropped |
//! | 2. Entity memory | `EntityMemoryStore` | Lowest-priority facts dropped |
//! | 3. Session | `SessionManager` | Oldest messages dropped, truncated last |

pub mod assembler;
pub mod session;
pub mod token;

pub use assembler::{
    AssembleOptions, AssembledContext, AssemblyMetadata, ContextAssembler, DropInfo, Layer,
    LayerBudgets, LayerStats, TokenBreakdown, to_prompt,
};
pub use session::{SessionContext, SessionManager, SessionRender};
