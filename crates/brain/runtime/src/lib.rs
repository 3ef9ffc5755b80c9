//! LlamaBrain runtime: the nine-stage inference pipeline behind one call.
//!
//! `submit(interaction_context)` runs expectancy → snapshot → prompt →
//! generation → parse → validate → mutate/dispatch, with retry escalation
//! and the fallback hierarchy around it and an audit record at the end of
//! every path. Interactions for one NPC are serialized; different NPCs run
//! in parallel.

#![deny(unsafe_code)]

mod config;
mod persona;
mod result;
mod runtime;
mod telemetry;

pub use config::{LimitsConfig, RuntimeConfig};
pub use persona::Persona;
pub use result::{BrainError, InteractionResult};
pub use runtime::{BrainBuilder, BrainRuntime};
pub use telemetry::init_telemetry;
