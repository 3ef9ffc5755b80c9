use llamabrain_prompt::FewShotExample;
use serde::{Deserialize, Serialize};

/// Designer-authored voice of one NPC: the system prompt and optional
/// few-shot priming. File loaders live outside the core; this is the shape
/// they produce.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub system_prompt: String,
    #[serde(default)]
    pub few_shot: Vec<FewShotExample>,
}

impl Persona {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            few_shot: Vec::new(),
        }
    }

    pub fn with_few_shot(mut self, examples: Vec<FewShotExample>) -> Self {
        self.few_shot = examples;
        self
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self::new("You are a character in a living world. Stay in character and answer briefly.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persona_round_trips() {
        let persona = Persona::new("You are the gate guard.").with_few_shot(vec![
            FewShotExample {
                player: "any news?".into(),
                npc: "quiet night".into(),
            },
        ]);
        let json = serde_json::to_string(&persona).unwrap();
        let back: Persona = serde_json::from_str(&json).unwrap();
        assert_eq!(persona, back);
    }
}
