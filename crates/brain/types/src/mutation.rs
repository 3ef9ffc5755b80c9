use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::authority::Authority;
use crate::hash::ContentHash;

/// A side-effect request aimed at a game system, e.g. "open door".
/// Dispatched after validation; never touches memory stores.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldIntent {
    /// Registered handler key. Unknown types are rejected by the gate.
    pub intent_type: String,
    pub target: String,
    #[serde(default)]
    pub payload: Value,
}

impl WorldIntent {
    pub fn new(intent_type: impl Into<String>, target: impl Into<String>, payload: Value) -> Self {
        Self {
            intent_type: intent_type.into(),
            target: target.into(),
            payload,
        }
    }
}

/// A tool-call request surfaced from generator output. Carried through the
/// pipeline opaquely; execution belongs to the embedding game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// A typed request to change authoritative memory.
///
/// `WriteCanonical` exists so that a generator's attempt to rewrite canon is
/// representable and can be rejected categorically at the gate, instead of
/// silently disappearing in the parser.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MutationRequest {
    AppendEpisodic {
        content: String,
        significance: f64,
        #[serde(default)]
        tags: Vec<String>,
    },
    TransformBelief {
        subject: String,
        statement: String,
        confidence_delta: f64,
    },
    TransformRelationship {
        subject: String,
        target: String,
        delta: f64,
    },
    EmitWorldIntent(WorldIntent),
    WriteCanonical {
        subject: String,
        value: Value,
    },
}

impl MutationRequest {
    /// Lowercase keyword used in the pattern wire form and in logs.
    pub fn keyword(&self) -> &'static str {
        match self {
            MutationRequest::AppendEpisodic { .. } => "episodic",
            MutationRequest::TransformBelief { .. } => "belief",
            MutationRequest::TransformRelationship { .. } => "relationship",
            MutationRequest::EmitWorldIntent(_) => "intent",
            MutationRequest::WriteCanonical { .. } => "canonical",
        }
    }

    /// Stable hash of the request content; list ordering in parsed output is
    /// defined over this so equivalent generator responses parse identically.
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::of_canonical(self).unwrap_or_else(|_| ContentHash::of_str(self.keyword()))
    }
}

/// A mutation request together with the authority its author claims.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposedMutation {
    pub request: MutationRequest,
    pub claimed_authority: Authority,
}

impl ProposedMutation {
    /// Wrap a request at the default tier for generator output.
    pub fn generator_derived(request: MutationRequest) -> Self {
        Self {
            request,
            claimed_authority: Authority::GeneratorDerived,
        }
    }

    pub fn with_authority(request: MutationRequest, claimed_authority: Authority) -> Self {
        Self {
            request,
            claimed_authority,
        }
    }

    pub fn content_hash(&self) -> ContentHash {
        self.request.content_hash()
    }
}
