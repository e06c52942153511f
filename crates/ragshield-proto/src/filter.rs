//! Filter expression types.
//!
//! [`FilterExpr`] is a small boolean tree over membership leaves. It is
//! generic over the field type so the same tree describes both the abstract
//! constraint (fields are [`MetadataField`]s) and the lowered, backend-bound
//! form (fields are native metadata key names).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Abstract metadata dimensions a constraint can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    /// Principal (user) allowed to read the document.
    Principal,
    /// Group allowed to read the document.
    Group,
    /// Semantic topic labels attached to the document.
    Topic,
    /// Semantic entity labels attached to the document.
    Entity,
}

impl MetadataField {
    /// All fields, in a fixed order.
    pub const ALL: [MetadataField; 4] = [
        MetadataField::Principal,
        MetadataField::Group,
        MetadataField::Topic,
        MetadataField::Entity,
    ];

    /// Lowercase name of the field.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataField::Principal => "principal",
            MetadataField::Group => "group",
            MetadataField::Topic => "topic",
            MetadataField::Entity => "entity",
        }
    }
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean filter tree.
///
/// Membership leaves have "any-of" semantics: for a list-valued metadata field,
/// `In` matches when at least one stored value is in `values`, and `NotIn`
/// matches when none is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterExpr<F> {
    /// Matches every document.
    True,
    /// Matches no document.
    False,
    /// Field equals value.
    Eq { field: F, value: String },
    /// Field intersects the given set.
    In { field: F, values: Vec<String> },
    /// Field is disjoint from the given set.
    NotIn { field: F, values: Vec<String> },
    /// All conditions must hold.
    And(Vec<FilterExpr<F>>),
    /// At least one condition must hold.
    Or(Vec<FilterExpr<F>>),
    /// Negation.
    Not(Box<FilterExpr<F>>),
}

/// Filter over abstract metadata dimensions.
pub type ConstraintExpr = FilterExpr<MetadataField>;

/// Filter over a backend's native metadata keys.
pub type NativeExpr = FilterExpr<String>;

impl<F> FilterExpr<F> {
    /// Create an equality filter.
    pub fn eq(field: F, value: impl Into<String>) -> Self {
        FilterExpr::Eq {
            field,
            value: value.into(),
        }
    }

    /// Create an IN filter.
    pub fn in_values<I, S>(field: F, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilterExpr::In {
            field,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a NOT IN filter.
    pub fn not_in_values<I, S>(field: F, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilterExpr::NotIn {
            field,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Create an AND combination.
    pub fn and(exprs: Vec<FilterExpr<F>>) -> Self {
        FilterExpr::And(exprs)
    }

    /// Create an OR combination.
    pub fn or(exprs: Vec<FilterExpr<F>>) -> Self {
        FilterExpr::Or(exprs)
    }

    /// Negate an expression.
    pub fn negate(expr: FilterExpr<F>) -> Self {
        FilterExpr::Not(Box::new(expr))
    }

    /// Check if this is the constant `True`.
    pub fn is_true(&self) -> bool {
        matches!(self, FilterExpr::True)
    }

    /// Check if this is the constant `False`.
    pub fn is_false(&self) -> bool {
        matches!(self, FilterExpr::False)
    }

    /// Check if this is a comparison leaf.
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            FilterExpr::Eq { .. } | FilterExpr::In { .. } | FilterExpr::NotIn { .. }
        )
    }

    /// Nesting depth. Leaves and constants have depth 1.
    pub fn depth(&self) -> usize {
        match self {
            FilterExpr::And(exprs) | FilterExpr::Or(exprs) => {
                1 + exprs.iter().map(FilterExpr::depth).max().unwrap_or(0)
            }
            FilterExpr::Not(inner) => 1 + inner.depth(),
            _ => 1,
        }
    }

    /// Field of a comparison leaf.
    pub fn field(&self) -> Option<&F> {
        match self {
            FilterExpr::Eq { field, .. }
            | FilterExpr::In { field, .. }
            | FilterExpr::NotIn { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Rewrite every field, stopping at the first error.
    pub fn try_map_fields<G, E>(
        self,
        f: &mut impl FnMut(F) -> Result<G, E>,
    ) -> Result<FilterExpr<G>, E> {
        Ok(match self {
            FilterExpr::True => FilterExpr::True,
            FilterExpr::False => FilterExpr::False,
            FilterExpr::Eq { field, value } => FilterExpr::Eq {
                field: f(field)?,
                value,
            },
            FilterExpr::In { field, values } => FilterExpr::In {
                field: f(field)?,
                values,
            },
            FilterExpr::NotIn { field, values } => FilterExpr::NotIn {
                field: f(field)?,
                values,
            },
            FilterExpr::And(exprs) => FilterExpr::And(
                exprs
                    .into_iter()
                    .map(|e| e.try_map_fields(f))
                    .collect::<Result<_, _>>()?,
            ),
            FilterExpr::Or(exprs) => FilterExpr::Or(
                exprs
                    .into_iter()
                    .map(|e| e.try_map_fields(f))
                    .collect::<Result<_, _>>()?,
            ),
            FilterExpr::Not(inner) => FilterExpr::Not(Box::new(inner.try_map_fields(f)?)),
        })
    }

    /// Fold constants and flatten nested combinations.
    ///
    /// The result is logically equivalent and keeps operand order, so two
    /// equal inputs always simplify to equal outputs.
    pub fn simplify(self) -> Self {
        match self {
            FilterExpr::In { values, .. } if values.is_empty() => FilterExpr::False,
            FilterExpr::NotIn { values, .. } if values.is_empty() => FilterExpr::True,
            FilterExpr::And(exprs) => {
                let mut flat = Vec::with_capacity(exprs.len());
                for expr in exprs.into_iter().map(FilterExpr::simplify) {
                    match expr {
                        FilterExpr::True => {}
                        FilterExpr::False => return FilterExpr::False,
                        FilterExpr::And(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                collapse(flat, FilterExpr::True, FilterExpr::And)
            }
            FilterExpr::Or(exprs) => {
                let mut flat = Vec::with_capacity(exprs.len());
                for expr in exprs.into_iter().map(FilterExpr::simplify) {
                    match expr {
                        FilterExpr::False => {}
                        FilterExpr::True => return FilterExpr::True,
                        FilterExpr::Or(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                collapse(flat, FilterExpr::False, FilterExpr::Or)
            }
            FilterExpr::Not(inner) => match inner.simplify() {
                FilterExpr::True => FilterExpr::False,
                FilterExpr::False => FilterExpr::True,
                FilterExpr::Not(twice) => *twice,
                other => FilterExpr::Not(Box::new(other)),
            },
            leaf => leaf,
        }
    }
}

fn collapse<F>(
    mut exprs: Vec<FilterExpr<F>>,
    identity: FilterExpr<F>,
    wrap: fn(Vec<FilterExpr<F>>) -> FilterExpr<F>,
) -> FilterExpr<F> {
    match exprs.len() {
        0 => identity,
        1 => exprs.remove(0),
        _ => wrap(exprs),
    }
}

impl<F: fmt::Display> fmt::Display for FilterExpr<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::True => write!(f, "TRUE"),
            FilterExpr::False => write!(f, "FALSE"),
            FilterExpr::Eq { field, value } => write!(f, "{} == {:?}", field, value),
            FilterExpr::In { field, values } => write!(f, "{} IN {:?}", field, values),
            FilterExpr::NotIn { field, values } => write!(f, "{} NOT IN {:?}", field, values),
            FilterExpr::And(exprs) => write_joined(f, exprs, " AND "),
            FilterExpr::Or(exprs) => write_joined(f, exprs, " OR "),
            FilterExpr::Not(inner) => {
                if inner.is_leaf() {
                    write!(f, "NOT ({})", inner)
                } else {
                    write!(f, "NOT {}", inner)
                }
            }
        }
    }
}

fn write_joined<F: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    exprs: &[FilterExpr<F>],
    sep: &str,
) -> fmt::Result {
    write!(f, "(")?;
    for (i, expr) in exprs.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", expr)?;
    }
    write!(f, ")")
}

/// A filter rendered into a backend's own grammar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeFilter {
    /// Document-style filter (Mongo-like operators, Qdrant conditions, ...).
    Json(serde_json::Value),
    /// Boolean expression string.
    Expression(String),
}

impl NativeFilter {
    /// JSON body, if this is a document-style filter.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            NativeFilter::Json(value) => Some(value),
            NativeFilter::Expression(_) => None,
        }
    }

    /// Expression text, if this is an expression filter.
    pub fn as_expression(&self) -> Option<&str> {
        match self {
            NativeFilter::Json(_) => None,
            NativeFilter::Expression(expr) => Some(expr),
        }
    }
}

impl fmt::Display for NativeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeFilter::Json(value) => write!(f, "{}", value),
            NativeFilter::Expression(expr) => f.write_str(expr),
        }
    }
}
