//! Typed `"exports"` field.

use serde_json::Value;

/// A node of a package's `"exports"` tree.
///
/// Object keys keep their declaration order; resolution depends on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportsMap {
    /// A target path, possibly containing one `*` placeholder.
    Target(String),
    /// Sub-path patterns (keys starting with `.`) and/or condition names.
    Map(Vec<(String, ExportsMap)>),
    /// Fallback array: the first alternative that resolves wins.
    Alternatives(Vec<ExportsMap>),
    /// `null` (or any other scalar): never matches.
    Excluded,
}

impl ExportsMap {
    /// Convert a raw JSON value into an exports tree.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::Target(s.clone()),
            Value::Object(obj) => Self::Map(
                obj.iter()
                    .map(|(k, v)| (k.clone(), Self::from_value(v)))
                    .collect(),
            ),
            Value::Array(items) => Self::Alternatives(items.iter().map(Self::from_value).collect()),
            _ => Self::Excluded,
        }
    }

    /// Look up a key of a map node.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ExportsMap> {
        match self {
            Self::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Iterate over the keys and children of a map node (empty otherwise).
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ExportsMap)> {
        let entries: &[(String, ExportsMap)] = match self {
            Self::Map(entries) => entries,
            _ => &[],
        };
        entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keeps_declaration_order() {
        let map = ExportsMap::from_value(&json!({
            "./z": "./z.js",
            "./a": "./a.js",
            "import": "./i.js"
        }));
        let keys: Vec<&str> = map.entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["./z", "./a", "import"]);
    }

    #[test]
    fn test_shapes() {
        assert_eq!(
            ExportsMap::from_value(&json!("./a.js")),
            ExportsMap::Target("./a.js".to_string())
        );
        assert_eq!(ExportsMap::from_value(&json!(null)), ExportsMap::Excluded);
        assert_eq!(ExportsMap::from_value(&json!(false)), ExportsMap::Excluded);
        assert_eq!(
            ExportsMap::from_value(&json!(["./a.js", null])),
            ExportsMap::Alternatives(vec![
                ExportsMap::Target("./a.js".to_string()),
                ExportsMap::Excluded
            ])
        );
    }

    #[test]
    fn test_get() {
        let map = ExportsMap::from_value(&json!({ ".": { "import": "./esm.js" } }));
        assert_eq!(
            map.get(".").and_then(|n| n.get("import")),
            Some(&ExportsMap::Target("./esm.js".to_string()))
        );
        assert!(map.get("./missing").is_none());
        assert!(ExportsMap::Target("x".to_string()).get(".").is_none());
    }
}
