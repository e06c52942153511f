//! Backend capability descriptors.
//!
//! A capability record states which filter operators a backend can express,
//! what its metadata keys are called and which structural limits apply.

use super::backend::BackendKind;
use ragshield_proto::MetadataField;
use std::collections::{BTreeMap, BTreeSet};

/// Metadata key holding principals and groups allowed to read a chunk.
pub const AUTHORIZED_IDENTITIES_FIELD: &str = "authorized_identities";

/// Metadata key holding semantic topic labels.
pub const SEMANTIC_TOPICS_FIELD: &str = "pebblo_semantic_topics";

/// Metadata key holding semantic entity labels.
pub const SEMANTIC_ENTITIES_FIELD: &str = "pebblo_semantic_entities";

/// Filter operators a backend may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operator {
    /// Conjunction.
    And,
    /// Disjunction.
    Or,
    /// Negation of an arbitrary sub-expression.
    Not,
    /// Equality leaf.
    Eq,
    /// Any-of membership leaf.
    In,
    /// None-of membership leaf.
    NotIn,
}

impl Operator {
    /// Check if this is a logical combinator rather than a comparison.
    pub fn is_logical(&self) -> bool {
        matches!(self, Operator::And | Operator::Or | Operator::Not)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::And => write!(f, "AND"),
            Operator::Or => write!(f, "OR"),
            Operator::Not => write!(f, "NOT"),
            Operator::Eq => write!(f, "EQ"),
            Operator::In => write!(f, "IN"),
            Operator::NotIn => write!(f, "NOT IN"),
        }
    }
}

/// Structural limits of a backend's filter grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendLimits {
    /// Maximum nesting depth of the filter tree.
    pub max_depth: Option<usize>,
    /// Maximum number of values in one membership leaf.
    pub max_in_values: Option<usize>,
    /// Minimum number of operands an AND/OR node must have.
    pub min_logical_operands: usize,
}

impl Default for BackendLimits {
    fn default() -> Self {
        Self {
            max_depth: None,
            max_in_values: None,
            min_logical_operands: 1,
        }
    }
}

/// Static description of one backend's filter support.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCapability {
    /// Backend this record describes.
    pub backend: BackendKind,
    /// Supported operators.
    pub operators: BTreeSet<Operator>,
    /// Native metadata key for each abstract field.
    pub fields: BTreeMap<MetadataField, String>,
    /// Structural limits.
    pub limits: BackendLimits,
}

impl BackendCapability {
    /// Create a record with no operators and no field mappings.
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            operators: BTreeSet::new(),
            fields: BTreeMap::new(),
            limits: BackendLimits::default(),
        }
    }

    /// Builtin record for a backend.
    pub fn builtin(backend: BackendKind) -> Self {
        use Operator::*;

        match backend {
            BackendKind::Pinecone => Self::new(backend)
                .with_operators([And, Or, Eq, In, NotIn])
                .with_standard_fields("")
                .with_limits(BackendLimits {
                    max_in_values: Some(10_000),
                    ..BackendLimits::default()
                }),
            // `match.except` keeps a point when any array element is outside the
            // list, so exclusion goes through `must_not` + `match.any` instead.
            BackendKind::Qdrant => Self::new(backend)
                .with_operators([And, Or, Not, Eq, In])
                .with_standard_fields("metadata."),
            BackendKind::PgVector => Self::new(backend)
                .with_operators([And, Or, Eq, In, NotIn])
                .with_standard_fields(""),
            BackendKind::Chroma => Self::new(backend)
                .with_operators([And, Or, Eq, In, NotIn])
                .with_standard_fields("")
                .with_limits(BackendLimits {
                    min_logical_operands: 2,
                    ..BackendLimits::default()
                }),
            BackendKind::Milvus => Self::new(backend)
                .with_operators([And, Or, Not, Eq, In])
                .with_standard_fields("")
                .with_limits(BackendLimits {
                    max_depth: Some(16),
                    ..BackendLimits::default()
                }),
            BackendKind::Faiss => Self::new(backend)
                .with_operators([And, Eq, In])
                .with_standard_fields(""),
        }
    }

    /// Set the supported operators.
    pub fn with_operators(mut self, operators: impl IntoIterator<Item = Operator>) -> Self {
        self.operators = operators.into_iter().collect();
        self
    }

    /// Remove an operator.
    pub fn without_operator(mut self, operator: Operator) -> Self {
        self.operators.remove(&operator);
        self
    }

    /// Map an abstract field to a native key.
    pub fn with_field(mut self, field: MetadataField, name: impl Into<String>) -> Self {
        self.fields.insert(field, name.into());
        self
    }

    /// Drop the mapping for a field.
    pub fn without_field(mut self, field: MetadataField) -> Self {
        self.fields.remove(&field);
        self
    }

    /// Set the structural limits.
    pub fn with_limits(mut self, limits: BackendLimits) -> Self {
        self.limits = limits;
        self
    }

    fn with_standard_fields(self, prefix: &str) -> Self {
        let identities = format!("{}{}", prefix, AUTHORIZED_IDENTITIES_FIELD);
        self.with_field(MetadataField::Principal, identities.clone())
            .with_field(MetadataField::Group, identities)
            .with_field(
                MetadataField::Topic,
                format!("{}{}", prefix, SEMANTIC_TOPICS_FIELD),
            )
            .with_field(
                MetadataField::Entity,
                format!("{}{}", prefix, SEMANTIC_ENTITIES_FIELD),
            )
    }

    /// Check if an operator is supported.
    pub fn supports(&self, operator: Operator) -> bool {
        self.operators.contains(&operator)
    }

    /// Native key for a field.
    pub fn field_name(&self, field: MetadataField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    /// Comma-separated operator list, for display.
    pub fn operators_display(&self) -> String {
        self.operators
            .iter()
            .map(Operator::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
