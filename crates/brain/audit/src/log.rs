use std::sync::RwLock;

use llamabrain_types::{NpcId, RecordId};
use tracing::debug;

use crate::record::AuditRecord;

/// Append-only in-memory audit log. Records are never modified or removed;
/// exporters read a snapshot.
#[derive(Debug, Default)]
pub struct AuditLog {
    records: RwLock<Vec<AuditRecord>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: AuditRecord) -> RecordId {
        let id = record.record_id.clone();
        if let Ok(mut records) = self.records.write() {
            debug!(record = %id, npc = %record.npc_id, "audit record appended");
            records.push(record);
        }
        id
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, id: &RecordId) -> Option<AuditRecord> {
        self.records
            .read()
            .ok()
            .and_then(|records| records.iter().find(|r| &r.record_id == id).cloned())
    }

    /// All records for one NPC, in append order.
    pub fn for_npc(&self, npc: &NpcId) -> Vec<AuditRecord> {
        self.records
            .read()
            .map(|records| {
                records
                    .iter()
                    .filter(|r| &r.npc_id == npc)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of the full log, in append order.
    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.records
            .read()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}
