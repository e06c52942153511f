//! Enforcement filter compiler.
//!
//! Compilation runs in three stages:
//!
//! 1. [`clause`] builds a backend-independent constraint from the identity
//!    and semantic contexts (identity OR-clause, deny-overrides semantic
//!    clauses).
//! 2. [`lower`] maps abstract fields to native keys and rewrites the tree so
//!    it only uses operators the backend supports, or fails.
//! 3. [`render`] emits the backend's own filter grammar.
//!
//! The compiler is a pure function of its inputs. It holds no state, so it
//! can run concurrently from any number of threads.

pub mod clause;
pub mod evaluate;
pub mod lower;
pub mod render;

pub use clause::{build_clauses, ConstraintClauses, ConstraintWarning, MissingIdentityPolicy};
pub use evaluate::{extract_filter_fields, FilterEvaluator};

use crate::error::EnforcementResult;
use crate::registry::{BackendCapability, BackendKind};
use ragshield_proto::{ConstraintExpr, Document, FilterExpr, Identity, NativeExpr, NativeFilter, SemanticContext};
use tracing::{debug, warn};

/// Options that change how constraints are compiled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Behaviour for requests without an authentication context.
    pub missing_identity: MissingIdentityPolicy,
}

/// What the next search is allowed to return.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    /// No restriction applies.
    Unrestricted,
    /// Nothing may be returned; the search should not run.
    DenyAll,
    /// Restrict the search with a native filter.
    Restrict(NativeFilter),
}

impl FilterOutcome {
    /// Native filter to pass to the search engine, if any.
    pub fn native(&self) -> Option<&NativeFilter> {
        match self {
            FilterOutcome::Restrict(filter) => Some(filter),
            _ => None,
        }
    }

    /// Check if nothing may be returned.
    pub fn is_deny_all(&self) -> bool {
        matches!(self, FilterOutcome::DenyAll)
    }

    /// Check if no restriction applies.
    pub fn is_unrestricted(&self) -> bool {
        matches!(self, FilterOutcome::Unrestricted)
    }
}

impl std::fmt::Display for FilterOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterOutcome::Unrestricted => write!(f, "<unrestricted>"),
            FilterOutcome::DenyAll => write!(f, "<deny-all>"),
            FilterOutcome::Restrict(filter) => write!(f, "{}", filter),
        }
    }
}

/// A filter compiled for one backend and one request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    /// Backend the filter was compiled for.
    pub backend: BackendKind,
    /// Backend-independent constraint.
    pub constraint: ConstraintExpr,
    /// Constraint lowered onto native keys and supported operators.
    pub expr: NativeExpr,
    /// Rendered result.
    pub outcome: FilterOutcome,
    /// Non-fatal findings.
    pub warnings: Vec<ConstraintWarning>,
}

impl CompiledFilter {
    /// Check whether a retrieved document satisfies this filter.
    pub fn permits(&self, document: &Document) -> bool {
        match self.outcome {
            FilterOutcome::Unrestricted => true,
            FilterOutcome::DenyAll => false,
            FilterOutcome::Restrict(_) => FilterEvaluator::evaluate(&self.expr, &document.metadata),
        }
    }
}

/// Compiles identity and semantic contexts into backend filters.
pub struct FilterCompiler;

impl FilterCompiler {
    /// Compile a request's constraints for one backend.
    pub fn compile(
        identity: Identity<'_>,
        semantic: Option<&SemanticContext>,
        capability: &BackendCapability,
        options: CompilerOptions,
    ) -> EnforcementResult<CompiledFilter> {
        let backend = capability.backend;
        let clauses = build_clauses(identity, semantic, options.missing_identity)?;

        for warning in &clauses.warnings {
            warn!(%backend, principal = %identity, %warning, "constraint warning");
        }

        let (expr, outcome) = match &clauses.expr {
            FilterExpr::True => (FilterExpr::True, FilterOutcome::Unrestricted),
            FilterExpr::False => (FilterExpr::False, FilterOutcome::DenyAll),
            constraint => {
                let lowered = lower::lower(constraint.clone(), capability)?;
                let rendered = render::render(&lowered, capability)?;
                (lowered, FilterOutcome::Restrict(rendered))
            }
        };

        debug!(%backend, principal = %identity, filter = %outcome, "compiled enforcement filter");

        Ok(CompiledFilter {
            backend,
            constraint: clauses.expr,
            expr,
            outcome,
            warnings: clauses.warnings,
        })
    }
}
