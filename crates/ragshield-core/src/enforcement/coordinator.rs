//! Enforcement coordinator.
//!
//! Resolves the retriever's backend, compiles the request's constraints for
//! it and attaches the result to the retriever's next search. Any failure
//! leaves the retriever untouched and refuses retrieval.

use super::audit::{AuditSink, EnforcementEvent, TracingAuditSink};
use super::config::EnforcementConfig;
use super::retriever::{RequestScope, RetrieverHandle, VectorStore};
use crate::compiler::{CompiledFilter, FilterCompiler, FilterOutcome};
use crate::error::EnforcementResult;
use crate::registry::CapabilityRegistry;
use ragshield_proto::{AuthContext, Document, Identity, RetrievalRequest, SemanticContext};
use std::sync::Arc;
use tracing::{debug, warn};

/// Applies identity and semantic enforcement to retrievers.
///
/// Cheap to share: the registry and audit sink are reference counted and
/// never mutated.
#[derive(Clone)]
pub struct Enforcer {
    registry: Arc<CapabilityRegistry>,
    config: EnforcementConfig,
    audit: Arc<dyn AuditSink>,
}

impl Enforcer {
    /// Create an enforcer over a registry.
    pub fn new(registry: Arc<CapabilityRegistry>, config: EnforcementConfig) -> Self {
        Self {
            registry,
            config,
            audit: Arc::new(TracingAuditSink),
        }
    }

    /// Create an enforcer whose registry is built from the configuration.
    pub fn from_config(config: EnforcementConfig) -> EnforcementResult<Self> {
        let registry = config.build_registry()?;
        Ok(Self::new(Arc::new(registry), config))
    }

    /// Send audit events to `sink` instead of `tracing`.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// Capability registry in use.
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Configuration in use.
    pub fn config(&self) -> &EnforcementConfig {
        &self.config
    }

    /// Wrap a store in a handle using the configured `k`.
    pub fn handle<S: VectorStore>(&self, store: S) -> RetrieverHandle<S> {
        RetrieverHandle::new(store).with_k(self.config.search_k)
    }

    /// Compile a filter for a backend without attaching it anywhere.
    pub fn compile(
        &self,
        backend_id: &str,
        auth: Option<&AuthContext>,
        semantic: Option<&SemanticContext>,
    ) -> EnforcementResult<CompiledFilter> {
        let capability = self.registry.get_capability(backend_id)?;
        FilterCompiler::compile(
            Identity::from_context(auth),
            semantic,
            capability,
            self.config.compiler_options(),
        )
    }

    /// Compile a filter for the handle's backend and attach it to the
    /// handle's next search.
    ///
    /// The returned request holds the handle's request lock until it is
    /// dropped, so its search runs with exactly the filter attached here.
    /// Compilation happens before the lock is taken. On error the handle
    /// keeps whatever it had before.
    pub fn apply_enforcement<'h, S: VectorStore>(
        &self,
        handle: &'h RetrieverHandle<S>,
        auth: Option<&AuthContext>,
        semantic: Option<&SemanticContext>,
    ) -> EnforcementResult<EnforcedRequest<'h, S>> {
        let compiled = self.compile_audited(handle.store_id(), auth, semantic)?;
        let scope = handle.begin();
        scope.attach(compiled.outcome.clone());
        Ok(EnforcedRequest { scope, compiled })
    }

    /// Enforce a request's constraints and run its search.
    ///
    /// Attaching and searching happen under the handle's request lock, so
    /// concurrent requests on one handle never see each other's filters.
    pub fn retrieve<S: VectorStore>(
        &self,
        handle: &RetrieverHandle<S>,
        request: &RetrievalRequest,
    ) -> EnforcementResult<Vec<Document>> {
        let backend_id = handle.store_id();
        let identity = request.identity();

        let enforced = self.apply_enforcement(
            handle,
            request.auth_context.as_ref(),
            request.semantic_context.as_ref(),
        )?;
        let documents = match enforced.search(&request.question) {
            Ok(documents) => documents,
            Err(e) => {
                warn!(backend = backend_id, error = %e, "similarity search failed");
                self.audit
                    .record(EnforcementEvent::rejected(backend_id, identity, e.to_string()));
                return Err(e);
            }
        };
        let compiled = enforced.into_compiled();

        let (documents, dropped) = if self.config.verify_results {
            let total = documents.len();
            let kept: Vec<Document> = documents
                .into_iter()
                .filter(|doc| compiled.permits(doc))
                .collect();
            let dropped = total - kept.len();
            if dropped > 0 {
                warn!(backend = backend_id, principal = %identity, dropped, "search returned documents outside the filter");
            }
            (kept, dropped)
        } else {
            (documents, 0)
        };

        self.audit.record(EnforcementEvent::retrieved(
            backend_id,
            identity,
            documents.len(),
            dropped,
        ));
        Ok(documents)
    }

    fn compile_audited(
        &self,
        backend_id: &str,
        auth: Option<&AuthContext>,
        semantic: Option<&SemanticContext>,
    ) -> EnforcementResult<CompiledFilter> {
        let identity = Identity::from_context(auth);
        let compiled = match self.compile(backend_id, auth, semantic) {
            Ok(compiled) => compiled,
            Err(e) => {
                warn!(backend = backend_id, principal = %identity, error = %e, "enforcement rejected");
                self.audit
                    .record(EnforcementEvent::rejected(backend_id, identity, e.to_string()));
                return Err(e);
            }
        };

        let event = match &compiled.outcome {
            FilterOutcome::DenyAll => {
                let reason = compiled
                    .warnings
                    .first()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "constraint is unsatisfiable".to_string());
                EnforcementEvent::denied_all(backend_id, identity, reason)
            }
            outcome => EnforcementEvent::filter_applied(backend_id, identity, outcome.to_string()),
        };
        debug!(backend = backend_id, principal = %identity, filter = %compiled.outcome, "enforcement applied");
        self.audit.record(event);
        Ok(compiled)
    }
}

impl std::fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enforcer")
            .field("backends", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

/// A filter attached to a handle, with the handle locked for its search.
#[must_use = "dropping the request releases the handle with the filter still pending"]
pub struct EnforcedRequest<'h, S> {
    scope: RequestScope<'h, S>,
    compiled: CompiledFilter,
}

impl<'h, S: VectorStore> EnforcedRequest<'h, S> {
    /// Filter that was attached.
    pub fn compiled(&self) -> &CompiledFilter {
        &self.compiled
    }

    /// Run the search the filter was attached for.
    pub fn search(&self, query: &str) -> EnforcementResult<Vec<Document>> {
        self.scope.search(query)
    }

    /// Release the handle and keep the compiled filter.
    pub fn into_compiled(self) -> CompiledFilter {
        self.compiled
    }
}

impl<S: VectorStore> std::fmt::Debug for EnforcedRequest<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnforcedRequest")
            .field("backend", &self.compiled.backend)
            .field("outcome", &self.compiled.outcome)
            .finish()
    }
}
