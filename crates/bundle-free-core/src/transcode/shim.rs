//! Export discovery and re-export shims.
//!
//! Bundlers cannot always see the export names of a CommonJS module, so the
//! cache hands them a small ES shim that names every export explicitly.
//! The names come from a textual scan of the source. The scan is a
//! heuristic: exports built dynamically (loops, computed keys, `Object.assign`)
//! are missed, and assignments inside functions are picked up as if they were
//! top-level. `default` is always re-exported for CommonJS sources, so a
//! missed name is still reachable through the default export.

use crate::error::TranscodeError;
use std::path::{Path, PathBuf};

/// Words that cannot appear as a bare name in an `export { ... }` list.
const RESERVED: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "import", "in", "instanceof", "new", "null", "return", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield", "let", "static",
];

/// Result of scanning a module source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportScan {
    /// Named exports in first-seen order, without `default`.
    pub names: Vec<String>,
    /// True when the source declares a default export.
    pub has_default: bool,
}

impl ExportScan {
    fn push(&mut self, name: &str) {
        let name = name.trim();
        if name == "default" {
            self.has_default = true;
            return;
        }
        if name == "__esModule" || !is_identifier(name) || RESERVED.contains(&name) {
            return;
        }
        if !self.names.iter().any(|n| n == name) {
            self.names.push(name.to_string());
        }
    }
}

/// Scan a source for CommonJS assignments and ES export declarations.
#[must_use]
pub fn scan_exports(source: &str) -> ExportScan {
    let mut scan = ExportScan::default();

    // exports.x = / module.exports.x =
    if let Ok(re) = regex_lite::Regex::new(r"\bexports\.([A-Za-z_$][\w$]*)\s*=([^=]|$)") {
        for caps in re.captures_iter(source) {
            scan.push(&caps[1]);
        }
    }

    // Object.defineProperty(exports, "x", ...)
    if let Ok(re) = regex_lite::Regex::new(
        r#"Object\.defineProperty\(\s*(?:module\.)?exports\s*,\s*['"]([^'"]+)['"]"#,
    ) {
        for caps in re.captures_iter(source) {
            scan.push(&caps[1]);
        }
    }

    // module.exports = { a, b: c }
    if let Ok(re) = regex_lite::Regex::new(r"\bmodule\.exports\s*=\s*\{([^}]*)\}") {
        for caps in re.captures_iter(source) {
            for member in split_members(&caps[1]) {
                let key = member
                    .split([':', '('])
                    .next()
                    .unwrap_or_default()
                    .trim_start_matches("async ")
                    .trim();
                scan.push(key.trim_matches(|c| c == '"' || c == '\''));
            }
        }
    }

    // export function f / export class C / export const a
    if let Ok(re) = regex_lite::Regex::new(
        r"(?m)^\s*export\s+(?:async\s+)?(?:function\s*\*?|class|const|let|var)\s+([A-Za-z_$][\w$]*)",
    ) {
        for caps in re.captures_iter(source) {
            scan.push(&caps[1]);
        }
    }

    // export { a, b as c } [from "..."]
    if let Ok(re) = regex_lite::Regex::new(r"(?m)^\s*export\s*\{([^}]*)\}") {
        for caps in re.captures_iter(source) {
            for member in split_members(&caps[1]) {
                let exported = member.rsplit(" as ").next().unwrap_or(member);
                scan.push(exported);
            }
        }
    }

    if let Ok(re) = regex_lite::Regex::new(r"(?m)^\s*export\s+default\b") {
        if re.is_match(source) {
            scan.has_default = true;
        }
    }

    scan
}

fn split_members(list: &str) -> impl Iterator<Item = &str> {
    list.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty() && !m.starts_with("..."))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn js_string(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    serde_json::Value::String(text).to_string()
}

/// Shim re-exporting `default` plus every scanned name of a CommonJS source.
#[must_use]
pub fn legacy_shim(source: &Path, scan: &ExportScan) -> String {
    let mut names = vec!["default"];
    names.extend(scan.names.iter().map(String::as_str));
    format!("export {{ {} }} from {};\n", names.join(", "), js_string(source))
}

/// Entry re-exporting a whole ES package.
#[must_use]
pub fn prebundle_entry(source: &Path, has_default: bool) -> String {
    let source = js_string(source);
    let mut entry = format!("export * from {source};\n");
    if has_default {
        entry.push_str(&format!("export {{ default }} from {source};\n"));
    }
    entry
}

/// Entry naming every scanned export of an ES package explicitly.
#[must_use]
pub fn named_prebundle_entry(source: &Path, scan: &ExportScan) -> String {
    let mut names: Vec<&str> = Vec::new();
    if scan.has_default {
        names.push("default");
    }
    names.extend(scan.names.iter().map(String::as_str));
    if names.is_empty() {
        return prebundle_entry(source, false);
    }
    format!("export {{ {} }} from {};\n", names.join(", "), js_string(source))
}

/// A temporary entry file, removed when dropped.
///
/// Removal is best effort: a leftover shim is harmless, so cleanup errors
/// are ignored.
#[derive(Debug)]
pub struct ShimFile {
    path: PathBuf,
}

impl ShimFile {
    /// Write `contents` to `path` and take ownership of the file.
    pub async fn create(path: PathBuf, contents: &str) -> Result<Self, TranscodeError> {
        // Owned before writing: dropped on any later failure.
        let shim = Self { path };
        bundle_free_util::fs::atomic_write(&shim.path, contents.as_bytes())
            .await
            .map_err(|source| TranscodeError::ShimWrite {
                path: shim.path.clone(),
                source,
            })?;
        Ok(shim)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ShimFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_commonjs_assignments() {
        let source = r#"
            "use strict";
            Object.defineProperty(exports, "__esModule", { value: true });
            exports.parse = parse;
            module.exports.format = function format() {};
            Object.defineProperty(exports, 'version', { get: () => v });
            if (exports.parse == null) {}
        "#;
        let scan = scan_exports(source);
        assert_eq!(scan.names, vec!["parse", "format", "version"]);
        assert!(!scan.has_default);
    }

    #[test]
    fn test_scan_module_exports_object() {
        let scan = scan_exports("module.exports = { a, b: helper, c(x), ...rest, 'd': 4 };");
        assert_eq!(scan.names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_scan_es_exports() {
        let source = "
export const a = 1;
export async function load() {}
export class Thing {}
export { b, c as d, e as default };
export default 42;
";
        let scan = scan_exports(source);
        assert_eq!(scan.names, vec!["a", "load", "Thing", "b", "d"]);
        assert!(scan.has_default);
    }

    #[test]
    fn test_scan_drops_invalid_names() {
        let source = r#"
            Object.defineProperty(exports, "not-an-ident", {});
            Object.defineProperty(exports, "class", {});
            exports.ok = 1;
            exports.ok = 2;
        "#;
        assert_eq!(scan_exports(source).names, vec!["ok"]);
    }

    #[test]
    fn test_legacy_shim() {
        let scan = ExportScan {
            names: vec!["a".to_string(), "b".to_string()],
            has_default: false,
        };
        assert_eq!(
            legacy_shim(Path::new("/nm/pkg/index.js"), &scan),
            "export { default, a, b } from \"/nm/pkg/index.js\";\n"
        );
        assert_eq!(
            legacy_shim(Path::new("/nm/pkg/index.js"), &ExportScan::default()),
            "export { default } from \"/nm/pkg/index.js\";\n"
        );
    }

    #[test]
    fn test_prebundle_entries() {
        let source = Path::new("/nm/lib/index.js");
        assert_eq!(
            prebundle_entry(source, false),
            "export * from \"/nm/lib/index.js\";\n"
        );
        assert_eq!(
            prebundle_entry(source, true),
            "export * from \"/nm/lib/index.js\";\nexport { default } from \"/nm/lib/index.js\";\n"
        );

        let scan = ExportScan {
            names: vec!["html".to_string()],
            has_default: true,
        };
        assert_eq!(
            named_prebundle_entry(source, &scan),
            "export { default, html } from \"/nm/lib/index.js\";\n"
        );
    }

    #[tokio::test]
    async fn test_shim_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exports-abc.js");
        {
            let shim = ShimFile::create(path.clone(), "export {};").await.unwrap();
            assert!(shim.path().exists());
        }
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_shim_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("exports.js");
        let err = ShimFile::create(path, "x").await.unwrap_err();
        assert!(matches!(err, TranscodeError::ShimWrite { .. }));
    }
}
