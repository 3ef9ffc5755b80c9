use serde::{Deserialize, Serialize};

/// Identifier of a non-player character. One brain instance serves many NPCs;
/// all memory, locking, and audit state is keyed by this.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NpcId(pub String);

impl NpcId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "npc:{}", self.0)
    }
}

/// Identifier of a scene or level.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SceneId(pub String);

impl SceneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for SceneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scene:{}", self.0)
    }
}

/// Stable identifier of a memory entry.
///
/// Entry ids are *derived*, not random: BLAKE3 over (npc, store, sequence).
/// Two runs that commit the same mutations in the same order therefore
/// produce byte-identical entries, which keeps store hashes replayable.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub String);

impl EntryId {
    /// Derive the id for the entry at `sequence` in `store` for `npc`.
    pub fn derive(npc: &NpcId, store: &str, sequence: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(npc.0.as_bytes());
        hasher.update(b"/");
        hasher.update(store.as_bytes());
        hasher.update(b"/");
        hasher.update(&sequence.to_be_bytes());
        let digest = hasher.finalize();
        let hex = digest.to_hex();
        Self(format!("ent:{}", &hex.as_str()[..16]))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a single audit record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub uuid::Uuid);

impl RecordId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::generate()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rec:{}", self.0)
    }
}

/// Identifier of a replay package.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageId(pub uuid::Uuid);

impl PackageId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for PackageId {
    fn default() -> Self {
        Self::generate()
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pkg:{}", self.0)
    }
}
