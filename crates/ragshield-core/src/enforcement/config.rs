//! Enforcement configuration.

use crate::compiler::{CompilerOptions, MissingIdentityPolicy};
use crate::enforcement::retriever::DEFAULT_SEARCH_K;
use crate::error::{EnforcementError, EnforcementResult};
use crate::registry::{BackendKind, CapabilityRegistry};
use ragshield_proto::MetadataField;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Configuration of an [`Enforcer`](super::Enforcer).
///
/// Loaded once at startup, usually from a JSON file:
///
/// ```json
/// {
///   "missing_identity": "deny_all",
///   "enabled_backends": ["qdrant", "pgvector"],
///   "field_overrides": { "qdrant": { "topic": "metadata.topics" } },
///   "search_k": 8
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnforcementConfig {
    /// Behaviour for requests without an authentication context.
    pub missing_identity: MissingIdentityPolicy,
    /// Backends to accept. `None` accepts every builtin backend.
    pub enabled_backends: Option<Vec<BackendKind>>,
    /// Per-backend renames of native metadata keys.
    pub field_overrides: BTreeMap<BackendKind, BTreeMap<MetadataField, String>>,
    /// Documents fetched per search by handles built from this config.
    pub search_k: usize,
    /// Re-check retrieved documents against the compiled filter and drop
    /// any that do not satisfy it.
    pub verify_results: bool,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            missing_identity: MissingIdentityPolicy::DenyAll,
            enabled_backends: None,
            field_overrides: BTreeMap::new(),
            search_k: DEFAULT_SEARCH_K,
            verify_results: false,
        }
    }
}

impl EnforcementConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON.
    pub fn from_json(input: &str) -> EnforcementResult<Self> {
        let config: Self = serde_json::from_str(input)
            .map_err(|e| EnforcementError::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> EnforcementResult<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|e| {
            EnforcementError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&input)
    }

    /// Set the missing-identity policy.
    pub fn with_missing_identity(mut self, policy: MissingIdentityPolicy) -> Self {
        self.missing_identity = policy;
        self
    }

    /// Restrict the accepted backends.
    pub fn with_enabled_backends(mut self, backends: impl IntoIterator<Item = BackendKind>) -> Self {
        self.enabled_backends = Some(backends.into_iter().collect());
        self
    }

    /// Rename the native key of a field on one backend.
    pub fn with_field_override(
        mut self,
        backend: BackendKind,
        field: MetadataField,
        name: impl Into<String>,
    ) -> Self {
        self.field_overrides
            .entry(backend)
            .or_default()
            .insert(field, name.into());
        self
    }

    /// Set the number of documents fetched per search.
    pub fn with_search_k(mut self, k: usize) -> Self {
        self.search_k = k;
        self
    }

    /// Enable or disable post-retrieval verification.
    pub fn with_verify_results(mut self, verify: bool) -> Self {
        self.verify_results = verify;
        self
    }

    /// Compiler options derived from this configuration.
    pub fn compiler_options(&self) -> CompilerOptions {
        CompilerOptions {
            missing_identity: self.missing_identity,
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> EnforcementResult<()> {
        if self.search_k == 0 {
            return Err(EnforcementError::Config("search_k must be at least 1".into()));
        }
        if let Some(enabled) = &self.enabled_backends {
            if let Some(kind) = self.field_overrides.keys().find(|k| !enabled.contains(*k)) {
                return Err(EnforcementError::Config(format!(
                    "field override for disabled backend {}",
                    kind
                )));
            }
        }
        Ok(())
    }

    /// Build the capability registry this configuration describes.
    pub fn build_registry(&self) -> EnforcementResult<CapabilityRegistry> {
        self.validate()?;
        let mut builder = CapabilityRegistry::builder();
        if let Some(enabled) = &self.enabled_backends {
            builder = builder.only(enabled);
        }
        for (backend, overrides) in &self.field_overrides {
            for (field, name) in overrides {
                builder = builder.override_field(*backend, *field, name.clone())?;
            }
        }
        Ok(builder.build())
    }
}
