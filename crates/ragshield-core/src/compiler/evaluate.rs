//! In-memory evaluation of lowered filters against document metadata.
//!
//! Used to double-check what a backend returned: a document that does not
//! satisfy the compiled filter must not reach the caller.

use ragshield_proto::{FilterExpr, NativeExpr};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Payload prefix some backends put in front of metadata keys.
const PAYLOAD_PREFIX: &str = "metadata.";

/// Extract all native keys referenced in a filter.
pub fn extract_filter_fields(filter: &NativeExpr) -> BTreeSet<String> {
    let mut fields = BTreeSet::new();
    extract_filter_fields_inner(filter, &mut fields);
    fields
}

fn extract_filter_fields_inner(filter: &NativeExpr, fields: &mut BTreeSet<String>) {
    match filter {
        FilterExpr::Eq { field, .. } | FilterExpr::In { field, .. } | FilterExpr::NotIn { field, .. } => {
            fields.insert(field.clone());
        }
        FilterExpr::And(exprs) | FilterExpr::Or(exprs) => {
            for expr in exprs {
                extract_filter_fields_inner(expr, fields);
            }
        }
        FilterExpr::Not(inner) => extract_filter_fields_inner(inner, fields),
        FilterExpr::True | FilterExpr::False => {}
    }
}

/// Evaluates native filters against document metadata.
pub struct FilterEvaluator;

impl FilterEvaluator {
    /// Check whether a metadata map satisfies the filter.
    ///
    /// Metadata values may be a string or an array of strings. A missing key
    /// holds no values: it never satisfies `Eq`/`In` and always satisfies
    /// `NotIn`.
    pub fn evaluate(filter: &NativeExpr, metadata: &Map<String, Value>) -> bool {
        match filter {
            FilterExpr::True => true,
            FilterExpr::False => false,
            FilterExpr::Eq { field, value } => Self::field_values(metadata, field)
                .iter()
                .any(|v| *v == value.as_str()),
            FilterExpr::In { field, values } => Self::intersects(metadata, field, values),
            FilterExpr::NotIn { field, values } => !Self::intersects(metadata, field, values),
            FilterExpr::And(exprs) => exprs.iter().all(|e| Self::evaluate(e, metadata)),
            FilterExpr::Or(exprs) => exprs.iter().any(|e| Self::evaluate(e, metadata)),
            FilterExpr::Not(inner) => !Self::evaluate(inner, metadata),
        }
    }

    fn intersects(metadata: &Map<String, Value>, field: &str, values: &[String]) -> bool {
        Self::field_values(metadata, field)
            .iter()
            .any(|stored| values.iter().any(|v| v.as_str() == *stored))
    }

    fn field_values<'a>(metadata: &'a Map<String, Value>, field: &str) -> Vec<&'a str> {
        let value = metadata.get(field).or_else(|| {
            field
                .strip_prefix(PAYLOAD_PREFIX)
                .and_then(|key| metadata.get(key))
        });
        match value {
            Some(Value::String(s)) => vec![s.as_str()],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn scenario() -> NativeExpr {
        FilterExpr::and(vec![
            FilterExpr::or(vec![
                FilterExpr::eq("authorized_identities".to_string(), "alice"),
                FilterExpr::in_values("authorized_identities".to_string(), ["team-a"]),
            ]),
            FilterExpr::not_in_values("pebblo_semantic_topics".to_string(), ["finance"]),
        ])
    }

    #[test]
    fn test_evaluate_identity_match() {
        let doc = metadata(json!({"authorized_identities": ["team-a", "team-c"]}));
        assert!(FilterEvaluator::evaluate(&scenario(), &doc));

        let doc = metadata(json!({"authorized_identities": "alice"}));
        assert!(FilterEvaluator::evaluate(&scenario(), &doc));

        let doc = metadata(json!({"authorized_identities": ["team-b"]}));
        assert!(!FilterEvaluator::evaluate(&scenario(), &doc));
    }

    #[test]
    fn test_evaluate_denied_topic() {
        let doc = metadata(json!({
            "authorized_identities": ["alice"],
            "pebblo_semantic_topics": ["travel", "finance"]
        }));
        assert!(!FilterEvaluator::evaluate(&scenario(), &doc));
    }

    #[test]
    fn test_evaluate_missing_field() {
        let doc = metadata(json!({}));
        assert!(!FilterEvaluator::evaluate(&scenario(), &doc));
        let not_in: NativeExpr = FilterExpr::not_in_values("topics".to_string(), ["x"]);
        assert!(FilterEvaluator::evaluate(&not_in, &doc));
    }

    #[test]
    fn test_evaluate_payload_prefix() {
        let expr: NativeExpr =
            FilterExpr::in_values("metadata.authorized_identities".to_string(), ["alice"]);
        let doc = metadata(json!({"authorized_identities": ["alice"]}));
        assert!(FilterEvaluator::evaluate(&expr, &doc));
    }

    #[test]
    fn test_extract_filter_fields() {
        let fields = extract_filter_fields(&scenario());
        let fields: Vec<_> = fields.iter().map(String::as_str).collect();
        assert_eq!(fields, vec!["authorized_identities", "pebblo_semantic_topics"]);
    }
}
