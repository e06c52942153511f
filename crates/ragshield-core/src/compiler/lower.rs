//! Lowering of abstract constraints onto a backend capability.
//!
//! Lowering maps abstract fields to native keys and rewrites the tree so it
//! only uses operators the backend declares. A rewrite is only applied when
//! it is logically equivalent; anything else is an error.

use crate::error::{EnforcementError, EnforcementResult};
use crate::registry::{BackendCapability, Operator};
use ragshield_proto::{ConstraintExpr, FilterExpr, NativeExpr};

/// Lower an abstract constraint to a native expression for one backend.
pub fn lower(expr: ConstraintExpr, capability: &BackendCapability) -> EnforcementResult<NativeExpr> {
    let backend = capability.backend;
    let mapped = expr.try_map_fields(&mut |field| {
        capability
            .field_name(field)
            .map(str::to_string)
            .ok_or(EnforcementError::MissingFieldMapping { backend, field })
    })?;

    let adapted = Lowering { capability }.adapt(mapped)?;

    if let Some(max_depth) = capability.limits.max_depth {
        let depth = adapted.depth();
        if depth > max_depth {
            return Err(EnforcementError::LimitExceeded {
                backend,
                limit: format!("filter depth {} exceeds {}", depth, max_depth),
            });
        }
    }

    Ok(adapted)
}

struct Lowering<'a> {
    capability: &'a BackendCapability,
}

impl Lowering<'_> {
    fn unsupported(&self, operator: Operator) -> EnforcementError {
        EnforcementError::UnsupportedFilterOperator {
            backend: self.capability.backend,
            operator,
        }
    }

    fn supports(&self, operator: Operator) -> bool {
        self.capability.supports(operator)
    }

    fn adapt(&self, expr: NativeExpr) -> EnforcementResult<NativeExpr> {
        match expr {
            FilterExpr::True | FilterExpr::False => Ok(expr),
            FilterExpr::Eq { field, value } => self.eq_leaf(field, value),
            FilterExpr::In { field, values } => self.in_leaf(field, values),
            FilterExpr::NotIn { field, values } => self.not_in_leaf(field, values),
            FilterExpr::Not(inner) => self.negation(*inner),
            FilterExpr::And(exprs) => {
                let exprs = self.adapt_all(exprs)?;
                self.combine(Operator::And, exprs)
            }
            FilterExpr::Or(exprs) => {
                let exprs = self.adapt_all(exprs)?;
                if self.supports(Operator::Or) {
                    return self.combine(Operator::Or, exprs);
                }
                self.fuse_disjunction(exprs)
                    .ok_or_else(|| self.unsupported(Operator::Or))?
            }
        }
    }

    fn adapt_all(&self, exprs: Vec<NativeExpr>) -> EnforcementResult<Vec<NativeExpr>> {
        exprs.into_iter().map(|e| self.adapt(e)).collect()
    }

    fn eq_leaf(&self, field: String, value: String) -> EnforcementResult<NativeExpr> {
        if self.supports(Operator::Eq) {
            Ok(FilterExpr::Eq { field, value })
        } else if self.supports(Operator::In) {
            Ok(FilterExpr::In {
                field,
                values: vec![value],
            })
        } else {
            Err(self.unsupported(Operator::Eq))
        }
    }

    fn in_leaf(&self, field: String, values: Vec<String>) -> EnforcementResult<NativeExpr> {
        self.check_in_size(&values)?;
        if self.supports(Operator::In) {
            Ok(FilterExpr::In { field, values })
        } else if values.len() == 1 && self.supports(Operator::Eq) {
            Ok(FilterExpr::Eq {
                field,
                value: values.into_iter().next().unwrap_or_default(),
            })
        } else {
            Err(self.unsupported(Operator::In))
        }
    }

    fn not_in_leaf(&self, field: String, values: Vec<String>) -> EnforcementResult<NativeExpr> {
        self.check_in_size(&values)?;
        if self.supports(Operator::NotIn) {
            Ok(FilterExpr::NotIn { field, values })
        } else if self.supports(Operator::Not) {
            Ok(FilterExpr::negate(self.in_leaf(field, values)?))
        } else {
            Err(self.unsupported(Operator::Not))
        }
    }

    /// Prefer a native none-of leaf, fall back to a generic NOT.
    fn negation(&self, inner: NativeExpr) -> EnforcementResult<NativeExpr> {
        match inner {
            FilterExpr::In { field, values } if self.supports(Operator::NotIn) => {
                self.not_in_leaf(field, values)
            }
            FilterExpr::Eq { field, value } if self.supports(Operator::NotIn) => {
                self.not_in_leaf(field, vec![value])
            }
            FilterExpr::NotIn { field, values } => self.in_leaf(field, values),
            inner if self.supports(Operator::Not) => Ok(FilterExpr::negate(self.adapt(inner)?)),
            _ => Err(self.unsupported(Operator::Not)),
        }
    }

    fn combine(&self, operator: Operator, mut exprs: Vec<NativeExpr>) -> EnforcementResult<NativeExpr> {
        // Singletons never need the combinator, which also keeps backends
        // requiring two or more operands satisfied.
        if exprs.len() == 1 {
            return Ok(exprs.remove(0));
        }
        if !self.supports(operator) {
            return Err(self.unsupported(operator));
        }
        let min = self.capability.limits.min_logical_operands;
        if exprs.len() < min {
            return Err(EnforcementError::LimitExceeded {
                backend: self.capability.backend,
                limit: format!("{} needs at least {} operands", operator, min),
            });
        }
        Ok(match operator {
            Operator::Or => FilterExpr::Or(exprs),
            _ => FilterExpr::And(exprs),
        })
    }

    /// `f == a OR f IN [b, c]` is `f IN [a, b, c]` when every branch targets
    /// the same key.
    fn fuse_disjunction(&self, exprs: Vec<NativeExpr>) -> Option<EnforcementResult<NativeExpr>> {
        let mut target: Option<String> = None;
        let mut values: Vec<String> = Vec::new();

        for expr in exprs {
            let (field, branch_values) = match expr {
                FilterExpr::Eq { field, value } => (field, vec![value]),
                FilterExpr::In { field, values } => (field, values),
                _ => return None,
            };
            match &target {
                Some(existing) if *existing != field => return None,
                Some(_) => {}
                None => target = Some(field),
            }
            for value in branch_values {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
        }

        let field = target?;
        Some(self.in_leaf(field, values))
    }

    fn check_in_size(&self, values: &[String]) -> EnforcementResult<()> {
        match self.capability.limits.max_in_values {
            Some(max) if values.len() > max => Err(EnforcementError::LimitExceeded {
                backend: self.capability.backend,
                limit: format!("{} membership values exceed {}", values.len(), max),
            }),
            _ => Ok(()),
        }
    }
}
