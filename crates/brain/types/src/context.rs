use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{NpcId, SceneId};

/// What caused an interaction to start.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    /// The player said something to the NPC.
    PlayerUtterance,
    /// A scheduled tick fired for this NPC.
    TimerTick,
    /// A scripted scene event targeted this NPC.
    SceneEvent,
    /// The player entered the NPC's awareness radius.
    Proximity,
    /// Game-specific trigger.
    Custom(String),
}

impl TriggerReason {
    pub fn tag(&self) -> &str {
        match self {
            TriggerReason::PlayerUtterance => "player_utterance",
            TriggerReason::TimerTick => "timer_tick",
            TriggerReason::SceneEvent => "scene_event",
            TriggerReason::Proximity => "proximity",
            TriggerReason::Custom(tag) => tag,
        }
    }
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Immutable inputs to one interaction. Built once at submission, then read
/// by expectancy evaluation, retrieval, prompt assembly, and validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionContext {
    pub trigger_reason: TriggerReason,
    pub npc_id: NpcId,
    pub scene_id: SceneId,
    /// Untrusted natural-language observation. May be empty for non-utterance
    /// triggers.
    pub player_input: String,
    /// Display name used for "mention the player" style constraints.
    pub player_name: Option<String>,
    /// Free-form tags game systems attach for rule matching.
    pub custom_tags: Vec<String>,
}

impl InteractionContext {
    pub fn builder(npc_id: NpcId, scene_id: SceneId, trigger_reason: TriggerReason) -> InteractionContextBuilder {
        InteractionContextBuilder {
            trigger_reason,
            npc_id,
            scene_id,
            player_input: String::new(),
            player_name: None,
            custom_tags: Vec::new(),
        }
    }
}

/// Builder for [`InteractionContext`].
pub struct InteractionContextBuilder {
    trigger_reason: TriggerReason,
    npc_id: NpcId,
    scene_id: SceneId,
    player_input: String,
    player_name: Option<String>,
    custom_tags: Vec<String>,
}

impl InteractionContextBuilder {
    pub fn player_input(mut self, input: impl Into<String>) -> Self {
        self.player_input = input.into();
        self
    }

    pub fn player_name(mut self, name: impl Into<String>) -> Self {
        self.player_name = Some(name.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.custom_tags.push(tag.into());
        self
    }

    pub fn build(self) -> InteractionContext {
        InteractionContext {
            trigger_reason: self.trigger_reason,
            npc_id: self.npc_id,
            scene_id: self.scene_id,
            player_input: self.player_input,
            player_name: self.player_name,
            custom_tags: self.custom_tags,
        }
    }
}

/// Who spoke a dialogue turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Player,
    Npc,
}

/// One turn of the dialogue-history tail carried into the prompt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl DialogueTurn {
    pub fn player(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            speaker: Speaker::Player,
            text: text.into(),
            at,
        }
    }

    pub fn npc(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            speaker: Speaker::Npc,
            text: text.into(),
            at,
        }
    }
}
