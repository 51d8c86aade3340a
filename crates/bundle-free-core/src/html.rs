//! HTML patching for served documents.
//!
//! Best-effort and regex based: documents are not parsed. Steps, in order:
//! 1. Quoted references to `<module>/...` are pointed at the mount path.
//! 2. The import map is merged into an existing `<script type="importmap">`
//!    in `<head>`, or injected at the top of `<head>`.
//! 3. The overlay script is added to `<head>`.
//! 4. The live-reload client is added before `</body>`.
//! 5. User replacements are applied.
//!
//! Steps 2 to 4 need a `<head>...</head>` block; without one the document
//! only gets steps 1 and 5.

use crate::config::{normalize_base, Replacement};
use crate::error::{Error, Result};
use crate::importmap::{ImportMap, MODULES_NAMESPACE};
use regex_lite::{Captures, Regex};
use tracing::warn;

/// File name of the overlay client inside the resolved-modules namespace.
pub const OVERLAY_SCRIPT: &str = "@overlay.js";

/// What to inject besides the import map.
#[derive(Debug, Clone, Default)]
pub struct PatchOptions {
    /// Requested package names whose quoted `name/` references are rewritten.
    pub module_names: Vec<String>,
    /// Inject the error overlay script.
    pub overlay: bool,
    /// Port of the live-reload server, if enabled.
    pub livereload: Option<u16>,
    /// Replacements, applied in order.
    pub replace: Vec<Replacement>,
}

/// Compiled HTML patcher.
#[derive(Debug)]
pub struct HtmlPatcher {
    import_map: ImportMap,
    module_ref: Option<Regex>,
    head: Regex,
    existing_map: Regex,
    overlay: bool,
    livereload: Option<u16>,
    replacements: Vec<(Regex, String)>,
}

impl HtmlPatcher {
    /// Compile a patcher for a placeholder import map.
    ///
    /// Fails when a regex replacement does not compile.
    pub fn new(import_map: ImportMap, options: PatchOptions) -> Result<Self> {
        let module_ref = if options.module_names.is_empty() {
            None
        } else {
            let names: Vec<String> = options
                .module_names
                .iter()
                .map(|n| regex_lite::escape(n))
                .collect();
            Some(compile(&format!(r#"(['"])((?:{})/)"#, names.join("|")))?)
        };

        let replacements = options
            .replace
            .iter()
            .map(|r| {
                let pattern = if r.regex {
                    r.from.clone()
                } else {
                    regex_lite::escape(&r.from)
                };
                let to = if r.regex {
                    r.to.clone()
                } else {
                    r.to.replace('$', "$$")
                };
                compile(&pattern).map(|re| (re, to))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            import_map,
            module_ref,
            head: compile(r"(?is)(<head\b[^>]*>)(.*?)(</head>)")?,
            existing_map: compile(
                r#"(?is)(<script\b[^>]*\btype\s*=\s*["']?importmap["']?[^>]*>)(.*?)(</script>)"#,
            )?,
            overlay: options.overlay,
            livereload: options.livereload,
            replacements,
        })
    }

    /// True when patching can change a document.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.import_map.is_empty()
            || self.module_ref.is_some()
            || self.overlay
            || self.livereload.is_some()
            || !self.replacements.is_empty()
    }

    /// Patch a document served under `mount`.
    #[must_use]
    pub fn patch(&self, mount: &str, html: &str) -> String {
        let mount = normalize_base(mount);

        let mut out = match &self.module_ref {
            Some(re) => re
                .replace_all(html, |caps: &Captures| {
                    format!("{}{mount}{MODULES_NAMESPACE}/{}", &caps[1], &caps[2])
                })
                .into_owned(),
            None => html.to_string(),
        };

        if let Some(head) = self.head.captures(&out) {
            let range = head.get(0).map_or(0..0, |m| m.range());
            let patched = format!("{}{}{}", &head[1], self.patch_head(&mount, &head[2]), &head[3]);
            out.replace_range(range, &patched);

            if let Some(port) = self.livereload {
                out = inject_livereload(&out, port);
            }
        }

        self.apply_replacements(out)
    }

    fn patch_head(&self, mount: &str, content: &str) -> String {
        let resolved = self.import_map.resolve(mount);
        let mut prefix = String::new();
        let mut content = content.to_string();

        if let Some(existing) = self.existing_map.captures(&content) {
            match serde_json::from_str::<ImportMap>(existing[2].trim()) {
                Ok(mut merged) => {
                    merged.merge(&resolved);
                    let range = existing.get(2).map_or(0..0, |m| m.range());
                    content.replace_range(range, &format!("\n{}\n", merged.to_json_pretty()));
                }
                Err(e) => {
                    warn!(error = %e, "existing import map is not valid JSON, leaving it unchanged");
                }
            }
        } else if !resolved.is_empty() {
            prefix.push_str(&format!(
                "\n<script type=\"importmap\">\n{}\n</script>",
                resolved.to_json_pretty()
            ));
        }

        if self.overlay {
            prefix.push_str(&format!(
                "\n<script src=\"{mount}{MODULES_NAMESPACE}/{OVERLAY_SCRIPT}\"></script>"
            ));
        }

        if prefix.is_empty() {
            content
        } else {
            format!("{prefix}\n{content}")
        }
    }

    fn apply_replacements(&self, mut text: String) -> String {
        for (re, to) in &self.replacements {
            text = re.replace_all(&text, to.as_str()).into_owned();
        }
        text
    }
}

/// One-shot patch; see [`HtmlPatcher`].
pub fn patch(mount: &str, html: &str, import_map: &ImportMap, options: PatchOptions) -> Result<String> {
    Ok(HtmlPatcher::new(import_map.clone(), options)?.patch(mount, html))
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::InvalidReplacement {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

fn inject_livereload(html: &str, port: u16) -> String {
    let Some(at) = html.to_ascii_lowercase().rfind("</body>") else {
        return html.to_string();
    };
    let script = format!(
        "<script>\n    document.write('<script src=\"http://' + (location.host || 'localhost').split(':')[0] + ':{port}/livereload.js?snipver=1\"></' + 'script>')\n</script>\n"
    );
    format!("{}{script}{}", &html[..at], &html[at..])
}
