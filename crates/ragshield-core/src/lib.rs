//! ragshield core - Capability registry, enforcement filter compiler and
//! retrieval coordinator.
//!
//! A request's identity and semantic constraints are compiled into the
//! native filter grammar of the vector store behind a retriever, then
//! attached to that retriever's next search. Anything that cannot be
//! enforced exactly is refused.
//!
//! # Example
//!
//! ```ignore
//! use ragshield_core::{CapabilityRegistry, EnforcementConfig, Enforcer};
//! use ragshield_proto::{AuthContext, SemanticContext};
//! use std::sync::Arc;
//!
//! let enforcer = Enforcer::new(Arc::new(CapabilityRegistry::builtin()), EnforcementConfig::default());
//! let handle = enforcer.handle(my_qdrant_store);
//!
//! let auth = AuthContext::new("alice").with_group("team-a");
//! let semantic = SemanticContext::new().deny_topic("finance");
//! let request = enforcer.apply_enforcement(&handle, Some(&auth), Some(&semantic))?;
//! let documents = request.search("Who approved the Q3 budget?")?;
//! ```

pub mod compiler;
pub mod enforcement;
pub mod error;
pub mod registry;

pub use compiler::{
    CompiledFilter, CompilerOptions, ConstraintWarning, FilterCompiler, FilterEvaluator,
    FilterOutcome, MissingIdentityPolicy,
};
pub use enforcement::{
    AuditSink, EnforcedRequest, EnforcementConfig, EnforcementEvent, EnforcementEventKind,
    Enforcer, MemoryAuditSink, NullAuditSink, RequestScope, RetrieverHandle, SearchError,
    TracingAuditSink, VectorStore,
};
pub use error::{EnforcementError, EnforcementResult};
pub use registry::{BackendCapability, BackendKind, BackendLimits, CapabilityRegistry, Operator};

/// Re-export protocol types.
pub use ragshield_proto as proto;
