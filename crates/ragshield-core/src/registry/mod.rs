//! Backend capability registry.
//!
//! The registry is the single gate between a retriever and the filter
//! compiler: a backend that is not registered never gets a filter compiled,
//! so it can never silently run unfiltered.
//!
//! Registries are built once at startup and are read-only afterwards. They
//! are `Send + Sync` and meant to be shared behind an `Arc` without locking.

pub mod backend;
pub mod capability;

pub use backend::BackendKind;
pub use capability::{
    BackendCapability, BackendLimits, Operator, AUTHORIZED_IDENTITIES_FIELD,
    SEMANTIC_ENTITIES_FIELD, SEMANTIC_TOPICS_FIELD,
};

use crate::error::{EnforcementError, EnforcementResult};
use ragshield_proto::MetadataField;
use std::collections::BTreeMap;
use std::sync::OnceLock;

static BUILTIN: OnceLock<CapabilityRegistry> = OnceLock::new();

/// Lookup table from backend to capability record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityRegistry {
    entries: BTreeMap<BackendKind, BackendCapability>,
}

impl CapabilityRegistry {
    /// Registry holding the builtin record of every known backend.
    pub fn builtin() -> Self {
        Self::builder().build()
    }

    /// Process-wide builtin registry.
    pub fn global() -> &'static CapabilityRegistry {
        BUILTIN.get_or_init(CapabilityRegistry::builtin)
    }

    /// Start building a registry from the builtin table.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            entries: BackendKind::ALL
                .into_iter()
                .map(|kind| (kind, BackendCapability::builtin(kind)))
                .collect(),
        }
    }

    /// Start building a registry with no entries.
    pub fn empty() -> RegistryBuilder {
        RegistryBuilder {
            entries: BTreeMap::new(),
        }
    }

    /// Check whether a store identifier resolves to a registered backend.
    pub fn is_supported(&self, backend_id: &str) -> bool {
        BackendKind::parse(backend_id).is_some_and(|kind| self.entries.contains_key(&kind))
    }

    /// Capability record for a store identifier.
    pub fn get_capability(&self, backend_id: &str) -> EnforcementResult<&BackendCapability> {
        BackendKind::parse(backend_id)
            .and_then(|kind| self.entries.get(&kind))
            .ok_or_else(|| EnforcementError::UnsupportedBackend {
                backend: backend_id.to_string(),
            })
    }

    /// Capability record for a backend kind.
    pub fn resolve(&self, kind: BackendKind) -> EnforcementResult<&BackendCapability> {
        self.entries
            .get(&kind)
            .ok_or_else(|| EnforcementError::UnsupportedBackend {
                backend: kind.to_string(),
            })
    }

    /// Registered records, in backend declaration order.
    pub fn backends(&self) -> impl Iterator<Item = &BackendCapability> {
        self.entries.values()
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no backend is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Startup-time builder for a [`CapabilityRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryBuilder {
    entries: BTreeMap<BackendKind, BackendCapability>,
}

impl RegistryBuilder {
    /// Register or replace a record.
    pub fn register(mut self, capability: BackendCapability) -> Self {
        self.entries.insert(capability.backend, capability);
        self
    }

    /// Keep only the listed backends.
    pub fn only(mut self, kinds: &[BackendKind]) -> Self {
        self.entries.retain(|kind, _| kinds.contains(kind));
        self
    }

    /// Remove a backend.
    pub fn remove(mut self, kind: BackendKind) -> Self {
        self.entries.remove(&kind);
        self
    }

    /// Rename the native key of one field on one backend.
    pub fn override_field(
        mut self,
        kind: BackendKind,
        field: MetadataField,
        name: impl Into<String>,
    ) -> EnforcementResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EnforcementError::Config(format!(
                "empty field name for {} on {}",
                field, kind
            )));
        }
        let capability = self.entries.get_mut(&kind).ok_or_else(|| {
            EnforcementError::Config(format!("field override for unregistered backend {}", kind))
        })?;
        capability.fields.insert(field, name);
        Ok(self)
    }

    /// Finish building.
    pub fn build(self) -> CapabilityRegistry {
        CapabilityRegistry {
            entries: self.entries,
        }
    }
}
