//! Built-in rule constructors covering the common constraint shapes. Games
//! register their own rules the same way; these ship because the default
//! pipeline and the test suite need realistic material.

use llamabrain_types::TriggerReason;

use crate::constraint::{Constraint, ConstraintKind, PredicateId, Provenance, Severity};
use crate::evaluator::{ExpectancyRule, RuleMeta};

/// Predicate id for "the dialogue mentions the player's name".
pub const MENTION_PLAYER_PREDICATE: &str = "dialogue-mentions-player";

/// Requirement to address the player by name whenever a name is known and the
/// trigger is an utterance.
pub fn mention_player(severity: Severity) -> ExpectancyRule {
    ExpectancyRule::new(
        RuleMeta::new("mention-player", 10, "address the player by name"),
        move |ctx| {
            let name = ctx.player_name.as_deref()?;
            if ctx.trigger_reason != TriggerReason::PlayerUtterance {
                return None;
            }
            Some(Constraint::new(
                ConstraintKind::Requirement,
                severity,
                format!("Address the player, {name}, by name."),
                PredicateId::new(MENTION_PLAYER_PREDICATE),
                Provenance::new("mention-player", ctx.trigger_reason.tag()),
            ))
        },
    )
}

/// Prohibition on a topic. The predicate id encodes the topic so the gate can
/// check it without any shared registry of topics.
pub fn forbidden_topic(topic: &str, severity: Severity) -> ExpectancyRule {
    let topic = topic.to_string();
    let rule_id = format!("forbid-{topic}");
    ExpectancyRule::new(
        RuleMeta::new(rule_id.clone(), 20, format!("never mention {topic}")),
        move |ctx| {
            Some(Constraint::new(
                ConstraintKind::Prohibition,
                severity,
                format!("Never mention {topic} under any circumstances."),
                PredicateId::new(format!("dialogue-mentions:{topic}")),
                Provenance::new(rule_id.clone(), ctx.trigger_reason.tag()),
            ))
        },
    )
}

/// Permission that also narrows the world-state view to the named keys.
/// Emitted only when one of `tags` is present on the context.
pub fn scene_world_keys(tag: &str, keys: Vec<String>) -> ExpectancyRule {
    let tag = tag.to_string();
    let rule_id = format!("world-keys-{tag}");
    ExpectancyRule::new(
        RuleMeta::new(rule_id.clone(), 30, "narrow world state for a scene tag"),
        move |ctx| {
            if !ctx.custom_tags.iter().any(|t| t == &tag) {
                return None;
            }
            Some(
                Constraint::new(
                    ConstraintKind::Permission,
                    Severity::Soft,
                    String::new(),
                    PredicateId::new(format!("world-scope:{tag}")),
                    Provenance::new(rule_id.clone(), tag.clone()),
                )
                .with_world_keys(keys.clone()),
            )
        },
    )
}

/// Requirement to stay terse on timer ticks, so ambient chatter does not
/// balloon into monologues.
pub fn terse_idle_chatter() -> ExpectancyRule {
    ExpectancyRule::new(
        RuleMeta::new("terse-idle", 40, "keep idle chatter short"),
        |ctx| {
            if ctx.trigger_reason != TriggerReason::TimerTick {
                return None;
            }
            Some(Constraint::new(
                ConstraintKind::Requirement,
                Severity::Soft,
                "Keep the remark to a single short sentence.",
                PredicateId::new("dialogue-is-terse"),
                Provenance::new("terse-idle", ctx.trigger_reason.tag()),
            ))
        },
    )
}
