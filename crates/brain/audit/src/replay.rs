use chrono::{DateTime, Utc};
use llamabrain_types::{FingerprintMismatch, ModelFingerprint, PackageId, RecordId, ReplayMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::record::AuditRecord;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("model fingerprint incompatible: {0:?}")]
    FingerprintIncompatible(FingerprintMismatch),

    #[error("replay package malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A self-describing set of audit records, exportable as JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplayPackage {
    pub package_id: PackageId,
    pub created_at: DateTime<Utc>,
    pub game_version: String,
    pub scene: String,
    pub model_fingerprint: ModelFingerprint,
    pub total_interactions: usize,
    pub records: Vec<AuditRecord>,
}

impl ReplayPackage {
    pub fn new(
        game_version: impl Into<String>,
        scene: impl Into<String>,
        model_fingerprint: ModelFingerprint,
        records: Vec<AuditRecord>,
    ) -> Self {
        Self {
            package_id: PackageId::generate(),
            created_at: Utc::now(),
            game_version: game_version.into(),
            scene: scene.into(),
            model_fingerprint,
            total_interactions: records.len(),
            records,
        }
    }

    /// Gate a replay attempt on fingerprint compatibility.
    pub fn check_fingerprint(
        &self,
        current: &ModelFingerprint,
        mode: ReplayMode,
    ) -> Result<(), ReplayError> {
        current
            .check_against(&self.model_fingerprint, mode)
            .map_err(ReplayError::FingerprintIncompatible)
    }

    pub fn to_json(&self) -> Result<String, ReplayError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ReplayError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// One observed difference between a recorded and a replayed interaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Drift {
    pub record_id: RecordId,
    pub field: String,
    pub recorded: String,
    pub replayed: String,
}

/// Field-by-field comparison of replayed records against recorded ones.
/// Any drift indicates non-determinism in the generator or the pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct DriftDetector;

impl DriftDetector {
    pub fn compare(recorded: &AuditRecord, replayed: &AuditRecord) -> Vec<Drift> {
        let mut drifts = Vec::new();
        let mut check = |field: &str, a: String, b: String| {
            if a != b {
                drifts.push(Drift {
                    record_id: recorded.record_id.clone(),
                    field: field.to_string(),
                    recorded: a,
                    replayed: b,
                });
            }
        };

        check(
            "prompt_hash",
            recorded.prompt_hash.to_hex(),
            replayed.prompt_hash.to_hex(),
        );
        check(
            "output_hash",
            recorded.output_hash.to_hex(),
            replayed.output_hash.to_hex(),
        );
        check(
            "approved_mutation_count",
            recorded.approved_mutation_count.to_string(),
            replayed.approved_mutation_count.to_string(),
        );
        check(
            "validation_passed",
            recorded.validation_passed.to_string(),
            replayed.validation_passed.to_string(),
        );
        check(
            "fallback_used",
            recorded.fallback_used.to_string(),
            replayed.fallback_used.to_string(),
        );
        drifts
    }

    /// Compare a whole package against replayed records, paired in order.
    pub fn compare_package(package: &ReplayPackage, replayed: &[AuditRecord]) -> Vec<Drift> {
        let mut drifts = Vec::new();
        if package.records.len() != replayed.len() {
            warn!(
                recorded = package.records.len(),
                replayed = replayed.len(),
                "replay record count mismatch"
            );
        }
        for (recorded, replayed) in package.records.iter().zip(replayed.iter()) {
            drifts.extend(Self::compare(recorded, replayed));
        }
        drifts
    }
}
