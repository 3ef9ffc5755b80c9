//! Core value types shared across the LlamaBrain pipeline.
//!
//! Everything in this crate is a plain value: identifiers, the authority
//! ladder, interaction context, mutation/intent unions, content hashing, and
//! the model fingerprint used by audit replay. Stores and policy live in the
//! downstream crates.

#![deny(unsafe_code)]

pub mod authority;
pub mod cancel;
pub mod context;
pub mod fingerprint;
pub mod hash;
pub mod ids;
pub mod mutation;

pub use authority::Authority;
pub use cancel::CancelSignal;
pub use context::{DialogueTurn, InteractionContext, Speaker, TriggerReason};
pub use fingerprint::{FingerprintMismatch, ModelFingerprint, ReplayMode};
pub use hash::{derive_attempt_seed, ContentHash, HashError};
pub use ids::{EntryId, NpcId, PackageId, RecordId, SceneId};
pub use mutation::{FunctionCall, MutationRequest, ProposedMutation, WorldIntent};
