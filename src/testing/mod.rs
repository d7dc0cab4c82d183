//! Testing Utilities Module
//!
//! In-memory chain and log builders for exercising the watcher without nodes.
//!
//! ## Submodules
//!
//! - `memory_source` - Programmable [`MemoryLogSource`]
//! - `fixtures` - Messenger log and receipt builders
//! - `assertions` - Outcome assertions

pub mod assertions;
pub mod fixtures;
pub mod memory_source;

// Re-export commonly used items
pub use assertions::*;
pub use fixtures::*;
pub use memory_source::*;
