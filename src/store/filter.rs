//! Metadata filter language shared by all store backends.
//!
//! JSON-shaped clauses: a plain `field: value` pair is an equality test,
//! `field: {"$ne": v}` and `field: {"$nin": [..]}` negate, and `$and` /
//! `$or` combine sub-clauses. Multiple keys in one object are an implicit
//! `$and`. A field absent from the metadata evaluates as JSON `null`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A filter expression over record metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(pub Value);

impl Filter {
    /// `field == value`
    pub fn eq(field: &str, value: Value) -> Self {
        Self(serde_json::json!({ field: value }))
    }

    /// `field != value`
    pub fn ne(field: &str, value: Value) -> Self {
        Self(serde_json::json!({ field: { "$ne": value } }))
    }

    /// `field` not in `values`
    pub fn nin(field: &str, values: Vec<Value>) -> Self {
        Self(serde_json::json!({ field: { "$nin": values } }))
    }

    /// All sub-filters must match.
    pub fn and(filters: Vec<Filter>) -> Self {
        let clauses: Vec<Value> = filters.into_iter().map(|f| f.0).collect();
        Self(serde_json::json!({ "$and": clauses }))
    }

    /// At least one sub-filter must match.
    pub fn or(filters: Vec<Filter>) -> Self {
        let clauses: Vec<Value> = filters.into_iter().map(|f| f.0).collect();
        Self(serde_json::json!({ "$or": clauses }))
    }

    /// Evaluate this filter against a metadata object.
    pub fn matches(&self, metadata: &Value) -> bool {
        clause_matches(&self.0, metadata)
    }
}

fn clause_matches(clause: &Value, metadata: &Value) -> bool {
    let Some(object) = clause.as_object() else {
        // A non-object clause is vacuous.
        return true;
    };

    object.iter().all(|(key, condition)| match key.as_str() {
        "$and" => condition
            .as_array()
            .is_some_and(|subs| subs.iter().all(|sub| clause_matches(sub, metadata))),
        "$or" => condition
            .as_array()
            .is_some_and(|subs| subs.iter().any(|sub| clause_matches(sub, metadata))),
        field => field_matches(metadata.get(field).unwrap_or(&Value::Null), condition),
    })
}

fn field_matches(actual: &Value, condition: &Value) -> bool {
    match condition.as_object() {
        Some(ops) if ops.keys().any(|k| k.starts_with('$')) => {
            ops.iter().all(|(op, operand)| match op.as_str() {
                "$ne" => actual != operand,
                "$nin" => operand
                    .as_array()
                    .is_none_or(|values| !values.contains(actual)),
                // Unknown operators never match; surfacing a typo beats
                // silently returning everything.
                _ => false,
            })
        }
        _ => actual == condition,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equality() {
        let filter = Filter::eq("kind", json!("path"));
        assert!(filter.matches(&json!({"kind": "path"})));
        assert!(!filter.matches(&json!({"kind": "schema"})));
        assert!(!filter.matches(&json!({})));
    }

    #[test]
    fn test_ne_matches_missing_field() {
        let filter = Filter::ne("is_file_metadata", json!(true));
        assert!(filter.matches(&json!({})));
        assert!(filter.matches(&json!({"is_file_metadata": false})));
        assert!(!filter.matches(&json!({"is_file_metadata": true})));
    }

    #[test]
    fn test_nin() {
        let filter = Filter::nin("method", vec![json!("GET"), json!("HEAD")]);
        assert!(filter.matches(&json!({"method": "POST"})));
        assert!(!filter.matches(&json!({"method": "GET"})));
        // Missing field is null, which is not in the list.
        assert!(filter.matches(&json!({})));
    }

    #[test]
    fn test_and_or_nesting() {
        let filter = Filter::and(vec![
            Filter::eq("spec_id", json!("abc")),
            Filter::or(vec![
                Filter::eq("method", json!("GET")),
                Filter::eq("method", json!("POST")),
            ]),
        ]);

        assert!(filter.matches(&json!({"spec_id": "abc", "method": "POST"})));
        assert!(!filter.matches(&json!({"spec_id": "abc", "method": "PUT"})));
        assert!(!filter.matches(&json!({"spec_id": "def", "method": "GET"})));
    }

    #[test]
    fn test_implicit_and_across_keys() {
        let filter = Filter(json!({"kind": "path", "method": "GET"}));
        assert!(filter.matches(&json!({"kind": "path", "method": "GET"})));
        assert!(!filter.matches(&json!({"kind": "path", "method": "POST"})));
    }

    #[test]
    fn test_unknown_operator_never_matches() {
        let filter = Filter(json!({"score": {"$gt": 3}}));
        assert!(!filter.matches(&json!({"score": 5})));
    }
}
