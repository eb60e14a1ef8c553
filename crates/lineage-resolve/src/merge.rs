//! Strategy application over per-level records.

use serde_json::{Map, Value};

use lineage_types::{AttrValue, AttributeKey, EntityId, MergeStrategy};

use crate::error::{ResolveError, ResolveResult};

/// The own value found at one level of an ancestor chain.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelRecord {
    pub entity: EntityId,
    pub value: AttrValue,
}

/// Combine chain records, ordered most-derived first, under `strategy`.
///
/// `key` is only used to label a [`ResolveError::TypeMismatch`].
pub fn merge_records(
    key: &AttributeKey,
    strategy: MergeStrategy,
    mut records: Vec<LevelRecord>,
) -> ResolveResult<Option<AttrValue>> {
    if records.len() <= 1 {
        return Ok(records.pop().map(|record| record.value));
    }

    match strategy {
        MergeStrategy::Override => Ok(Some(records.swap_remove(0).value)),
        MergeStrategy::Merge => {
            let mut merged = Map::new();
            for record in records.into_iter().rev() {
                match record.value {
                    Value::Object(map) => merged.extend(map),
                    other => {
                        return Err(ResolveError::TypeMismatch {
                            key: key.clone(),
                            entity: record.entity,
                            found: value_kind(&other),
                        })
                    }
                }
            }
            Ok(Some(Value::Object(merged)))
        }
        MergeStrategy::Concat => {
            let mut items = Vec::new();
            for record in records.into_iter().rev() {
                match record.value {
                    Value::Array(values) => items.extend(values),
                    scalar => items.push(scalar),
                }
            }
            Ok(Some(Value::Array(items)))
        }
    }
}

/// Human-readable JSON kind of a value.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "map",
    }
}
