use serde::{Deserialize, Serialize};

/// Writer authority tier. The ordering is total and meaningful: a write is
/// accepted only when the writer's tier is at least the tier the target store
/// requires.
///
/// `GeneratorDerived` is the tier granted to mutations that survived the
/// validation gate. It sits one step above `Belief`, so validated output can
/// write beliefs and episodic memory but never world state or canon.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    /// Lowest tier. Sufficient only for the belief store.
    Belief,
    /// Mutations derived from validated generator output.
    GeneratorDerived,
    /// Game systems (quest logic, triggers, schedulers).
    GameSystem,
    /// Designer-authored content, applied at load time only.
    Designer,
}

impl Authority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Authority::Belief => "belief",
            Authority::GeneratorDerived => "generator_derived",
            Authority::GameSystem => "game_system",
            Authority::Designer => "designer",
        }
    }

    /// Whether this tier may write to a store requiring `required`.
    pub fn permits(&self, required: Authority) -> bool {
        *self >= required
    }
}

impl std::fmt::Display for Authority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
