//! Authoritative memory system.
//!
//! Four typed stores per NPC (canonical facts, world state, episodic
//! memories, beliefs) behind a strict authority hierarchy. The canonical
//! store is sealed after load: any runtime write is rejected. Entries are
//! arena-stored and tombstoned, never removed, so sequence numbers stay
//! stable for replay. Episodic decay is computed at read time, which keeps
//! snapshots immutable.

#![deny(unsafe_code)]

mod entry;
mod error;
mod filter;
mod store;
mod system;

pub use entry::{
    strict_total_order, EntryDraft, EntryHeader, MemoryContent, MemoryEntry, MemoryKind,
};
pub use error::MemoryError;
pub use filter::MemoryFilter;
pub use store::{DecayConfig, MemoryStore};
pub use system::{
    ContradictionPolicy, MemoryConfig, MemoryOp, MemorySystem, NpcMemory,
};
