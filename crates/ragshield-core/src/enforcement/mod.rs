//! Enforcement of compiled filters on retrievers.
//!
//! - [`coordinator`] - The [`Enforcer`]: resolve, compile, attach, fail closed
//! - [`retriever`] - The [`VectorStore`] seam and the per-request filter slot
//! - [`config`] - Startup configuration
//! - [`audit`] - Audit events and sinks

pub mod audit;
pub mod config;
pub mod coordinator;
pub mod retriever;

pub use audit::{
    AuditSink, EnforcementEvent, EnforcementEventKind, MemoryAuditSink, NullAuditSink,
    TracingAuditSink,
};
pub use config::EnforcementConfig;
pub use coordinator::{EnforcedRequest, Enforcer};
pub use retriever::{RequestScope, RetrieverHandle, SearchError, VectorStore, DEFAULT_SEARCH_K};
