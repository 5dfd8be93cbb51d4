//! Flatten nested JSON records into ordered, string-valued rows.

use serde_json::Value;

/// One flat row: `(column, cell)` pairs in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatRow {
    cells: Vec<(String, String)>,
}

impl FlatRow {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn push(&mut self, key: String, value: String) {
        if let Some(slot) = self.cells.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.cells.push((key, value));
        }
    }
}

/// Flatten a JSON value. Nested object keys are joined with `_`
/// (`git.start.commit` becomes `git_start_commit`).
///
/// A top-level scalar lands in a single column named `value`.
pub fn flatten(value: &Value) -> FlatRow {
    let mut row = FlatRow::default();
    match value {
        Value::Object(_) => flatten_into(&mut row, "", value),
        other => row.push("value".to_string(), cell(other)),
    }
    row
}

fn flatten_into(row: &mut FlatRow, prefix: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let name = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}_{key}")
                };
                match child {
                    // An empty or null nested section still gets a column so
                    // rows from experiments without git line up.
                    Value::Object(inner) if inner.is_empty() => row.push(name, String::new()),
                    Value::Object(_) => flatten_into(row, &name, child),
                    other => row.push(name, cell(other)),
                }
            }
        }
        other => row.push(prefix.to_string(), cell(other)),
    }
}

/// Render a leaf. Arrays are comma-joined; objects inside arrays use their
/// `name` field when present.
fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(obj) => obj
                    .get("name")
                    .map(cell)
                    .unwrap_or_else(|| item.to_string()),
                other => cell(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_keys_are_underscore_joined_in_order() {
        let row = flatten(&json!({
            "exp_id": "a",
            "git": {"start": {"commit": "abc", "dirty": false}, "last": null},
            "project": "p"
        }));
        let keys: Vec<&str> = row.keys().collect();
        assert_eq!(
            keys,
            vec!["exp_id", "git_start_commit", "git_start_dirty", "git_last", "project"]
        );
        assert_eq!(row.get("git_start_dirty"), Some("false"));
        assert_eq!(row.get("git_last"), Some(""));
    }

    #[test]
    fn arrays_are_comma_joined() {
        let row = flatten(&json!({
            "dirty_files": ["a.py", "b.py"],
            "gpu": [{"name": "A100", "memory": "40 GiB"}, {"name": "A100"}]
        }));
        assert_eq!(row.get("dirty_files"), Some("a.py,b.py"));
        assert_eq!(row.get("gpu"), Some("A100,A100"));
    }

    #[test]
    fn empty_sections_keep_a_column() {
        let row = flatten(&json!({"env": {}}));
        assert_eq!(row.get("env"), Some(""));
        assert_eq!(row.len(), 1);
    }
}
