//! Rendering of lowered expressions into native filter grammars.

use crate::error::{EnforcementError, EnforcementResult};
use crate::registry::{BackendCapability, BackendKind, Operator};
use ragshield_proto::{FilterExpr, NativeExpr, NativeFilter};
use serde_json::{json, Map, Value};

/// Render a lowered expression for the capability's backend.
///
/// Constants never reach a renderer: the compiler turns them into
/// unrestricted or deny-all outcomes first.
pub fn render(expr: &NativeExpr, capability: &BackendCapability) -> EnforcementResult<NativeFilter> {
    let backend = capability.backend;
    match backend {
        BackendKind::Pinecone | BackendKind::PgVector | BackendKind::Chroma => {
            Ok(NativeFilter::Json(mongo_style(expr, backend)?))
        }
        BackendKind::Qdrant => {
            let rendered = qdrant(expr, backend)?;
            // Top level must be a filter object, not a bare condition.
            let filter = if rendered.get("key").is_some() {
                json!({ "must": [rendered] })
            } else {
                rendered
            };
            Ok(NativeFilter::Json(filter))
        }
        BackendKind::Milvus => Ok(NativeFilter::Expression(milvus(expr, backend)?)),
        BackendKind::Faiss => Ok(NativeFilter::Json(faiss(expr, backend)?)),
    }
}

fn unsupported(backend: BackendKind, operator: Operator) -> EnforcementError {
    EnforcementError::UnsupportedFilterOperator { backend, operator }
}

fn constant(backend: BackendKind) -> EnforcementError {
    EnforcementError::InvalidConstraint(format!(
        "constant filter reached the {} renderer",
        backend
    ))
}

/// `$and` / `$or` / `$eq` / `$in` / `$nin` document filters.
fn mongo_style(expr: &NativeExpr, backend: BackendKind) -> EnforcementResult<Value> {
    Ok(match expr {
        FilterExpr::Eq { field, value } => json!({ field: { "$eq": value } }),
        FilterExpr::In { field, values } => json!({ field: { "$in": values } }),
        FilterExpr::NotIn { field, values } => json!({ field: { "$nin": values } }),
        FilterExpr::And(exprs) => json!({ "$and": mongo_all(exprs, backend)? }),
        FilterExpr::Or(exprs) => json!({ "$or": mongo_all(exprs, backend)? }),
        FilterExpr::Not(_) => return Err(unsupported(backend, Operator::Not)),
        FilterExpr::True | FilterExpr::False => return Err(constant(backend)),
    })
}

fn mongo_all(exprs: &[NativeExpr], backend: BackendKind) -> EnforcementResult<Vec<Value>> {
    exprs.iter().map(|e| mongo_style(e, backend)).collect()
}

/// Qdrant `must` / `should` / `must_not` filter objects.
fn qdrant(expr: &NativeExpr, backend: BackendKind) -> EnforcementResult<Value> {
    Ok(match expr {
        FilterExpr::Eq { field, value } => json!({ "key": field, "match": { "value": value } }),
        FilterExpr::In { field, values } => json!({ "key": field, "match": { "any": values } }),
        FilterExpr::NotIn { .. } => return Err(unsupported(backend, Operator::NotIn)),
        FilterExpr::And(exprs) => json!({ "must": qdrant_all(exprs, backend)? }),
        FilterExpr::Or(exprs) => json!({ "should": qdrant_all(exprs, backend)? }),
        FilterExpr::Not(inner) => json!({ "must_not": [qdrant(inner, backend)?] }),
        FilterExpr::True | FilterExpr::False => return Err(constant(backend)),
    })
}

fn qdrant_all(exprs: &[NativeExpr], backend: BackendKind) -> EnforcementResult<Vec<Value>> {
    exprs.iter().map(|e| qdrant(e, backend)).collect()
}

/// Milvus boolean expressions over array fields.
fn milvus(expr: &NativeExpr, backend: BackendKind) -> EnforcementResult<String> {
    Ok(match expr {
        FilterExpr::Eq { field, value } => {
            format!("array_contains({}, {})", field, quote(value))
        }
        FilterExpr::In { field, values } => {
            let quoted: Vec<String> = values.iter().map(|v| quote(v)).collect();
            format!("array_contains_any({}, [{}])", field, quoted.join(", "))
        }
        FilterExpr::NotIn { .. } => return Err(unsupported(backend, Operator::NotIn)),
        FilterExpr::And(exprs) => milvus_joined(exprs, " and ", backend)?,
        FilterExpr::Or(exprs) => milvus_joined(exprs, " or ", backend)?,
        FilterExpr::Not(inner) => format!("not ({})", milvus(inner, backend)?),
        FilterExpr::True | FilterExpr::False => return Err(constant(backend)),
    })
}

fn milvus_joined(exprs: &[NativeExpr], sep: &str, backend: BackendKind) -> EnforcementResult<String> {
    let parts = exprs
        .iter()
        .map(|e| milvus(e, backend))
        .collect::<EnforcementResult<Vec<_>>>()?;
    Ok(format!("({})", parts.join(sep)))
}

fn quote(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

/// FAISS flat dictionary: one key per condition, all conditions AND-ed.
fn faiss(expr: &NativeExpr, backend: BackendKind) -> EnforcementResult<Value> {
    let leaves: Vec<&NativeExpr> = match expr {
        FilterExpr::And(exprs) => exprs.iter().collect(),
        leaf => vec![leaf],
    };

    let mut map = Map::new();
    for leaf in leaves {
        let (field, value) = match leaf {
            FilterExpr::Eq { field, value } => (field, json!(value)),
            FilterExpr::In { field, values } => (field, json!(values)),
            FilterExpr::NotIn { .. } => return Err(unsupported(backend, Operator::NotIn)),
            FilterExpr::Not(_) => return Err(unsupported(backend, Operator::Not)),
            FilterExpr::Or(_) => return Err(unsupported(backend, Operator::Or)),
            FilterExpr::And(_) => return Err(unsupported(backend, Operator::And)),
            FilterExpr::True | FilterExpr::False => return Err(constant(backend)),
        };
        if map.insert(field.clone(), value).is_some() {
            return Err(EnforcementError::LimitExceeded {
                backend,
                limit: format!("key {} constrained more than once", field),
            });
        }
    }
    Ok(Value::Object(map))
}
