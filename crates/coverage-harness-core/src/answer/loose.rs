//! Loosely-typed JSON as produced by the generation service.
//!
//! [`LooseValue`] exists only between parsing and verdict mapping. Nothing
//! outside the [`answer`](crate::answer) module receives one.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LooseValue {
    Scalar(Scalar),
    Sequence(Vec<LooseValue>),
    /// Keys in source order.
    Mapping(Vec<(String, LooseValue)>),
}

impl From<Value> for LooseValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => LooseValue::Scalar(Scalar::Null),
            Value::Bool(b) => LooseValue::Scalar(Scalar::Bool(b)),
            Value::Number(n) => match n.as_f64() {
                Some(f) => LooseValue::Scalar(Scalar::Number(f)),
                None => LooseValue::Scalar(Scalar::Text(n.to_string())),
            },
            Value::String(s) => LooseValue::Scalar(Scalar::Text(s)),
            Value::Array(items) => {
                LooseValue::Sequence(items.into_iter().map(LooseValue::from).collect())
            }
            Value::Object(map) => LooseValue::Mapping(
                map.into_iter()
                    .map(|(k, v)| (k, LooseValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl LooseValue {
    /// Recursively unwrap descriptor objects down to plain values.
    ///
    /// A mapping with a `value` key and at most three keys becomes its
    /// `value`. A mapping with a `type` key and exactly one other key
    /// becomes that other key's value. Applies at every depth, including
    /// inside sequences.
    pub fn flatten(self) -> LooseValue {
        match self {
            LooseValue::Mapping(entries) => match unwrap_descriptor(entries) {
                Ok(inner) => inner.flatten(),
                Err(entries) => LooseValue::Mapping(
                    entries
                        .into_iter()
                        .map(|(k, v)| (k, v.flatten()))
                        .collect(),
                ),
            },
            LooseValue::Sequence(items) => {
                LooseValue::Sequence(items.into_iter().map(LooseValue::flatten).collect())
            }
            scalar => scalar,
        }
    }

    pub fn get(&self, key: &str) -> Option<&LooseValue> {
        match self {
            LooseValue::Mapping(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// First of `keys` that is present and not null.
    pub fn get_any(&self, keys: &[&str]) -> Option<&LooseValue> {
        keys.iter()
            .filter_map(|key| self.get(key))
            .find(|v| !v.is_null())
    }

    pub fn entries(&self) -> &[(String, LooseValue)] {
        match self {
            LooseValue::Mapping(entries) => entries,
            _ => &[],
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, LooseValue::Scalar(Scalar::Null))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            LooseValue::Scalar(Scalar::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Render a non-null scalar as a string.
    pub fn scalar_string(&self) -> Option<String> {
        match self {
            LooseValue::Scalar(Scalar::Text(s)) => Some(s.clone()),
            LooseValue::Scalar(Scalar::Number(n)) => Some(format_number(*n)),
            LooseValue::Scalar(Scalar::Bool(b)) => Some(b.to_string()),
            _ => None,
        }
    }
}

fn unwrap_descriptor(
    mut entries: Vec<(String, LooseValue)>,
) -> Result<LooseValue, Vec<(String, LooseValue)>> {
    if entries.len() <= 3 {
        if let Some(pos) = entries.iter().position(|(k, _)| k == "value") {
            return Ok(entries.swap_remove(pos).1);
        }
    }
    if entries.len() == 2 {
        if let Some(pos) = entries.iter().position(|(k, _)| k == "type") {
            return Ok(entries.swap_remove(1 - pos).1);
        }
    }
    Err(entries)
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loose(v: Value) -> LooseValue {
        LooseValue::from(v)
    }

    #[test]
    fn test_flatten_type_value_wrappers() {
        let v = loose(json!({
            "covered": {"type": "string", "value": "Yes"},
            "confidence": {"type": "number", "value": 0.8}
        }))
        .flatten();
        assert_eq!(v.get("covered").and_then(|c| c.as_text()), Some("Yes"));
        assert_eq!(
            v.get("confidence"),
            Some(&LooseValue::Scalar(Scalar::Number(0.8)))
        );
    }

    #[test]
    fn test_flatten_nested_and_in_lists() {
        let v = loose(json!({
            "caveats": {"value": [{"type": "string", "value": "30-day waiting period"}]},
            "citations": [{"file": {"value": {"value": "a.pdf"}}, "page": 3}]
        }))
        .flatten();
        let caveats = v.get("caveats").unwrap();
        assert_eq!(
            caveats,
            &LooseValue::Sequence(vec![LooseValue::Scalar(Scalar::Text(
                "30-day waiting period".to_string()
            ))])
        );
        let citation = match v.get("citations").unwrap() {
            LooseValue::Sequence(items) => items[0].clone(),
            other => panic!("expected sequence, got {:?}", other),
        };
        assert_eq!(citation.get("file").and_then(|f| f.as_text()), Some("a.pdf"));
    }

    #[test]
    fn test_flatten_type_with_single_other_key() {
        let v = loose(json!({"explanation": {"type": "string", "text": "Covered."}})).flatten();
        assert_eq!(v.get("explanation").and_then(|e| e.as_text()), Some("Covered."));
    }

    #[test]
    fn test_flatten_leaves_plain_mappings() {
        let citation = json!({"file": "a.pdf", "page": 2, "section": "S", "quote": "q"});
        let v = loose(citation.clone()).flatten();
        assert_eq!(v, loose(citation));
    }

    #[test]
    fn test_get_any_skips_null() {
        let v = loose(json!({"covered": null, "answer": "No"}));
        assert_eq!(v.get_any(&["covered", "answer"]).and_then(|c| c.as_text()), Some("No"));
    }

    #[test]
    fn test_scalar_string() {
        assert_eq!(loose(json!(3)).scalar_string().as_deref(), Some("3"));
        assert_eq!(loose(json!(2.5)).scalar_string().as_deref(), Some("2.5"));
        assert_eq!(loose(json!(true)).scalar_string().as_deref(), Some("true"));
        assert_eq!(loose(json!(null)).scalar_string(), None);
    }
}
