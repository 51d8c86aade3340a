//! Package descriptors.
//!
//! A [`Descriptor`] is the typed view of a package's `package.json`: the
//! fields that matter for picking an entry point and walking dependencies.
//! The [`DescriptorStore`] loads descriptors from a `node_modules` tree and
//! memoizes them together with their transitive closures.

mod exports_map;
mod store;

pub use exports_map::ExportsMap;
pub use store::DescriptorStore;

use crate::error::{Error, Result};
use serde_json::Value;

/// Declared module system of a package (`"type"` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleType {
    /// `"type": "module"` - `.js` files are ES modules.
    Module,
    /// `"type": "commonjs"`.
    CommonJs,
    /// No `"type"` field (Node treats this as CommonJS).
    #[default]
    Unspecified,
}

impl ModuleType {
    fn from_field(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("module") => Self::Module,
            Some("commonjs") => Self::CommonJs,
            _ => Self::Unspecified,
        }
    }

    /// True when plain `.js` files of the package are ES modules.
    #[must_use]
    pub fn is_esm(self) -> bool {
        self == Self::Module
    }
}

impl std::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Module => write!(f, "module"),
            Self::CommonJs => write!(f, "commonjs"),
            Self::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Declared contract of one package.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    /// Package name, unique within a `node_modules` tree.
    pub name: String,
    /// Package version (empty when not declared).
    pub version: String,
    /// Declared module system.
    pub module_type: ModuleType,
    /// Legacy `"main"` entry.
    pub main: Option<String>,
    /// ES-specific `"module"` entry.
    pub module: Option<String>,
    /// Parsed `"exports"` field.
    pub exports: Option<ExportsMap>,
    /// Names of declared `"dependencies"`, in declaration order.
    pub dependencies: Vec<String>,
}

impl Descriptor {
    /// Build a descriptor from a parsed `package.json`.
    ///
    /// `name` is used when the file does not declare one (and for errors).
    pub fn from_value(name: &str, value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| Error::InvalidDescriptor {
            name: name.to_string(),
            message: "package.json is not a JSON object".to_string(),
        })?;

        let string_field = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);

        let exports = match obj.get("exports") {
            None | Some(Value::Null) => None,
            Some(v) => Some(ExportsMap::from_value(v)),
        };

        let dependencies = obj
            .get("dependencies")
            .and_then(Value::as_object)
            .map(|deps| deps.keys().cloned().collect())
            .unwrap_or_default();

        Ok(Self {
            name: string_field("name").unwrap_or_else(|| name.to_string()),
            version: string_field("version").unwrap_or_default(),
            module_type: ModuleType::from_field(obj.get("type")),
            main: string_field("main"),
            module: string_field("module"),
            exports,
            dependencies,
        })
    }

    /// Parse a descriptor from `package.json` text.
    pub fn from_json_str(name: &str, text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        // A non-object root is reported through the same error channel as bad JSON.
        Self::from_value(name, &value).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}
