use serde::{Deserialize, Serialize};

/// How strictly a replay requires the current model to match the recorded one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    /// All fingerprint fields must be exactly equal.
    Strict,
    /// Name, quantization, and parameter size must match; minor schema
    /// version drift is tolerated.
    Compatible,
}

/// Why two fingerprints were judged incompatible.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FingerprintMismatch {
    Name { recorded: String, current: String },
    Quantization { recorded: String, current: String },
    ParameterSize { recorded: String, current: String },
    SchemaVersion { recorded: semver::Version, current: semver::Version },
}

/// Identity of the model a generator backend is serving.
///
/// Recorded into every replay package. The pipeline never enforces generator
/// determinism across models; this is the evidence needed to refuse a replay
/// against the wrong one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFingerprint {
    pub name: String,
    pub quantization: String,
    pub parameter_size: String,
    pub schema_version: semver::Version,
}

impl ModelFingerprint {
    pub fn new(
        name: impl Into<String>,
        quantization: impl Into<String>,
        parameter_size: impl Into<String>,
        schema_version: semver::Version,
    ) -> Self {
        Self {
            name: name.into(),
            quantization: quantization.into(),
            parameter_size: parameter_size.into(),
            schema_version,
        }
    }

    /// Check this (current) fingerprint against a recorded one.
    pub fn check_against(
        &self,
        recorded: &ModelFingerprint,
        mode: ReplayMode,
    ) -> Result<(), FingerprintMismatch> {
        if self.name != recorded.name {
            return Err(FingerprintMismatch::Name {
                recorded: recorded.name.clone(),
                current: self.name.clone(),
            });
        }
        if self.quantization != recorded.quantization {
            return Err(FingerprintMismatch::Quantization {
                recorded: recorded.quantization.clone(),
                current: self.quantization.clone(),
            });
        }
        if self.parameter_size != recorded.parameter_size {
            return Err(FingerprintMismatch::ParameterSize {
                recorded: recorded.parameter_size.clone(),
                current: self.parameter_size.clone(),
            });
        }
        let version_ok = match mode {
            ReplayMode::Strict => self.schema_version == recorded.schema_version,
            ReplayMode::Compatible => self.schema_version.major == recorded.schema_version.major,
        };
        if !version_ok {
            return Err(FingerprintMismatch::SchemaVersion {
                recorded: recorded.schema_version.clone(),
                current: self.schema_version.clone(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for ModelFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}, {}, schema {})",
            self.name, self.quantization, self.parameter_size, self.schema_version
        )
    }
}
