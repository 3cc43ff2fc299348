//! Shared readers for declared sections of the resolved tree.
//!
//! A section may be written either as an object keyed by id or as an array
//! of entries carrying an `id`. Both forms read into the same `Entry` list.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::domain::resolved::json_type_name;
use crate::ir::error::{IrError, IrResult};

/// One declared entry of a section.
#[derive(Debug, Clone)]
pub(crate) struct Entry<'a> {
    pub id: String,
    pub body: Option<&'a Map<String, Value>>,
}

impl<'a> Entry<'a> {
    /// First non-empty string among `keys`.
    pub fn text(&self, keys: &[&str]) -> Option<&'a str> {
        text(self.body, keys)
    }

    /// Ids referenced by the first present field among `keys`.
    pub fn id_list(&self, keys: &[&str]) -> Vec<String> {
        let Some(body) = self.body else {
            return Vec::new();
        };
        keys.iter()
            .find_map(|k| body.get(*k))
            .map(ids_of)
            .unwrap_or_default()
    }

    pub fn field(&self, key: &str) -> Option<&'a Value> {
        self.body.and_then(|b| b.get(key))
    }
}

pub(crate) fn text<'a>(body: Option<&'a Map<String, Value>>, keys: &[&str]) -> Option<&'a str> {
    let body = body?;
    keys.iter()
        .filter_map(|k| body.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn ids_of(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim()),
                Value::Object(obj) => obj.get("id").and_then(Value::as_str).map(str::trim),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        // `depends_on: { db: true, cache: true }`
        Value::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

/// Read every entry of a section. A missing or `null` section is empty.
pub(crate) fn entries<'a>(section: &str, value: Option<&'a Value>) -> IrResult<Vec<Entry<'a>>> {
    let malformed_entry = |entry: &str, reason: &str| IrError::MalformedEntry {
        section: section.to_string(),
        entry: entry.to_string(),
        reason: reason.to_string(),
    };

    let mut out = Vec::new();
    match value {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => {
            for (key, item) in map {
                let body = match item {
                    Value::Object(obj) => Some(obj),
                    Value::Null | Value::Bool(true) => None,
                    other => {
                        return Err(malformed_entry(
                            key,
                            &format!("expected object, got {}", json_type_name(other)),
                        ))
                    }
                };
                out.push(Entry {
                    id: key.trim().to_string(),
                    body,
                });
            }
        }
        Some(Value::Array(items)) => {
            for (idx, item) in items.iter().enumerate() {
                let entry = match item {
                    Value::String(s) => Entry {
                        id: s.trim().to_string(),
                        body: None,
                    },
                    Value::Object(obj) => {
                        let id = text(Some(obj), &["id", "name"])
                            .ok_or_else(|| malformed_entry(&idx.to_string(), "missing id"))?;
                        Entry {
                            id: id.to_string(),
                            body: Some(obj),
                        }
                    }
                    other => {
                        return Err(malformed_entry(
                            &idx.to_string(),
                            &format!("expected object or string, got {}", json_type_name(other)),
                        ))
                    }
                };
                out.push(entry);
            }
        }
        Some(other) => {
            return Err(IrError::MalformedSection {
                section: section.to_string(),
                reason: format!("expected object or array, got {}", json_type_name(other)),
            })
        }
    }

    let mut seen = BTreeSet::new();
    for entry in &out {
        if entry.id.is_empty() {
            return Err(malformed_entry("", "empty id"));
        }
        if !seen.insert(entry.id.as_str()) {
            return Err(malformed_entry(&entry.id, "duplicate id"));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_and_array_forms_agree() {
        let keyed = json!({ "auth": { "name": "Auth" }, "billing": null });
        let listed = json!([{ "id": "auth", "name": "Auth" }, "billing"]);

        let a = entries("capabilities", Some(&keyed)).unwrap();
        let b = entries("capabilities", Some(&listed)).unwrap();
        let ids_a: Vec<_> = a.iter().map(|e| e.id.as_str()).collect();
        let ids_b: Vec<_> = b.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids_a, vec!["auth", "billing"]);
        assert_eq!(ids_a, ids_b);
        assert_eq!(a[0].text(&["label", "name"]), Some("Auth"));
    }

    #[test]
    fn test_missing_section_is_empty() {
        assert!(entries("services", None).unwrap().is_empty());
        assert!(entries("services", Some(&Value::Null)).unwrap().is_empty());
    }

    #[test]
    fn test_scalar_section_is_malformed() {
        let err = entries("services", Some(&json!(42))).unwrap_err();
        assert!(matches!(err, IrError::MalformedSection { .. }));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = entries("services", Some(&json!(["api", { "id": "api" }]))).unwrap_err();
        assert!(err.to_string().contains("duplicate id"));
    }

    #[test]
    fn test_id_list_shapes() {
        let value = json!({
            "a": { "depends_on": "db" },
            "b": { "depends_on": ["db", { "id": "cache" }, 7] },
            "c": { "requires": { "queue": true } }
        });
        let list = entries("services", Some(&value)).unwrap();
        let keys = ["depends_on", "requires"];
        assert_eq!(list[0].id_list(&keys), vec!["db"]);
        assert_eq!(list[1].id_list(&keys), vec!["db", "cache"]);
        assert_eq!(list[2].id_list(&keys), vec!["queue"]);
    }
}
