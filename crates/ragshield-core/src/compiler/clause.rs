//! Abstract clause construction.
//!
//! Turns an identity and a semantic context into a backend-independent
//! [`ConstraintExpr`]. Nothing here knows about native field names or
//! operator support; that is the job of lowering.

use crate::error::{EnforcementError, EnforcementResult};
use ragshield_proto::{AuthContext, ConstraintExpr, FilterExpr, Identity, MetadataField, SemanticContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What to do when a request carries no authentication context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingIdentityPolicy {
    /// Retrieve nothing.
    #[default]
    DenyAll,
    /// Apply no identity restriction. Semantic restrictions still apply; with
    /// no semantic context either, retrieval is unrestricted.
    Skip,
}

/// Non-fatal findings about a constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintWarning {
    /// Every allowed label of a dimension is also denied, so nothing can match.
    UnsatisfiableAllowList {
        /// Dimension concerned.
        field: MetadataField,
        /// Allowed labels, all of them overridden by the deny list.
        labels: Vec<String>,
    },
    /// Some allowed labels were dropped because they are also denied.
    OverriddenAllow {
        /// Dimension concerned.
        field: MetadataField,
        /// Labels removed from the allow list.
        labels: Vec<String>,
    },
    /// No identity was supplied and the policy denies anonymous access.
    AnonymousDenied,
}

impl std::fmt::Display for ConstraintWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintWarning::UnsatisfiableAllowList { field, labels } => write!(
                f,
                "every allowed {} is denied ({}); nothing can match",
                field,
                labels.join(", ")
            ),
            ConstraintWarning::OverriddenAllow { field, labels } => write!(
                f,
                "allowed {} labels also denied: {}",
                field,
                labels.join(", ")
            ),
            ConstraintWarning::AnonymousDenied => {
                write!(f, "no authentication context; anonymous access denied")
            }
        }
    }
}

/// Abstract constraint plus the warnings raised while building it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintClauses {
    /// Simplified constraint tree.
    pub expr: ConstraintExpr,
    /// Non-fatal findings.
    pub warnings: Vec<ConstraintWarning>,
}

/// Build the abstract constraint for a request.
pub fn build_clauses(
    identity: Identity<'_>,
    semantic: Option<&SemanticContext>,
    policy: MissingIdentityPolicy,
) -> EnforcementResult<ConstraintClauses> {
    let semantic = semantic.filter(|ctx| !ctx.is_empty());
    if let Some(ctx) = semantic {
        validate_semantic(ctx)?;
    }

    let mut warnings = Vec::new();
    let identity_clause = match identity {
        Identity::Authenticated(auth) => identity_clause(auth)?,
        Identity::Anonymous => match policy {
            MissingIdentityPolicy::DenyAll => {
                return Ok(ConstraintClauses {
                    expr: FilterExpr::False,
                    warnings: vec![ConstraintWarning::AnonymousDenied],
                });
            }
            MissingIdentityPolicy::Skip => FilterExpr::True,
        },
    };

    let mut clauses = vec![identity_clause];
    if let Some(ctx) = semantic {
        clauses.extend(dimension_clauses(
            MetadataField::Topic,
            &ctx.allowed_topics,
            &ctx.denied_topics,
            &mut warnings,
        ));
        clauses.extend(dimension_clauses(
            MetadataField::Entity,
            &ctx.allowed_entities,
            &ctx.denied_entities,
            &mut warnings,
        ));
    }

    Ok(ConstraintClauses {
        expr: FilterExpr::and(clauses).simplify(),
        warnings,
    })
}

/// `principal == user_id OR group IN user_auth`.
fn identity_clause(auth: &AuthContext) -> EnforcementResult<ConstraintExpr> {
    if auth.user_id.trim().is_empty() {
        return Err(EnforcementError::InvalidConstraint(
            "auth context has an empty user_id".into(),
        ));
    }
    if auth.user_auth.iter().any(|g| g.trim().is_empty()) {
        return Err(EnforcementError::InvalidConstraint(format!(
            "auth context for {} contains an empty group",
            auth.user_id
        )));
    }

    let principal = FilterExpr::eq(MetadataField::Principal, auth.user_id.clone());
    if auth.user_auth.is_empty() {
        return Ok(principal);
    }
    Ok(FilterExpr::or(vec![
        principal,
        FilterExpr::in_values(MetadataField::Group, auth.user_auth.iter().cloned()),
    ]))
}

/// Deny clause first, then the allow clause; deny always wins.
fn dimension_clauses(
    field: MetadataField,
    allowed: &BTreeSet<String>,
    denied: &BTreeSet<String>,
    warnings: &mut Vec<ConstraintWarning>,
) -> Vec<ConstraintExpr> {
    let mut clauses = Vec::with_capacity(2);

    if !denied.is_empty() {
        clauses.push(FilterExpr::negate(FilterExpr::in_values(
            field,
            denied.iter().cloned(),
        )));
    }

    if !allowed.is_empty() {
        let (overridden, remaining): (Vec<&String>, Vec<&String>) =
            allowed.iter().partition(|label| denied.contains(*label));

        if remaining.is_empty() {
            warnings.push(ConstraintWarning::UnsatisfiableAllowList {
                field,
                labels: overridden.into_iter().cloned().collect(),
            });
            clauses.push(FilterExpr::False);
        } else {
            if !overridden.is_empty() {
                warnings.push(ConstraintWarning::OverriddenAllow {
                    field,
                    labels: overridden.into_iter().cloned().collect(),
                });
            }
            clauses.push(FilterExpr::in_values(field, remaining.into_iter().cloned()));
        }
    }

    clauses
}

fn validate_semantic(ctx: &SemanticContext) -> EnforcementResult<()> {
    if ctx.labels().any(|label| label.trim().is_empty()) {
        return Err(EnforcementError::InvalidConstraint(
            "semantic context contains an empty label".into(),
        ));
    }
    Ok(())
}
