//! Request routing decisions for the resolved-modules namespace.
//!
//! The [`ResolutionContext`] owns every piece of per-configuration state
//! (descriptors, transcode cache, import map, HTML patcher). The serving
//! layer asks it what to do with `<mount>node_modules/bundle-free/...`
//! requests and how to patch HTML documents.

use crate::config::BundleFreeConfig;
use crate::descriptor::DescriptorStore;
use crate::error::Result;
use crate::html::{HtmlPatcher, PatchOptions};
use crate::importmap::{self, ExportedPackage, ImportMap, ImportMapBuild, MODULES_NAMESPACE};
use crate::paths::{find_node_modules_root, is_valid_package_name, NODE_MODULES};
use crate::resolver::{resolve_export, BundleKind, ResolutionKind, ROOT};
use crate::transcode::{Bundler, CommandBundler, TranscodeCache};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// What the serving layer should do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Send the client to another URL.
    Redirect(String),
    /// Serve another URL in place of the requested one.
    Rewrite(String),
    /// Not handled here; continue with the next handler.
    PassThrough,
}

/// A request for a package in the resolved-modules namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRequest<'a> {
    /// Package name (`pkg` or `@scope/pkg`).
    pub name: &'a str,
    /// Normalized sub-path (`.` or `./...`).
    pub subpath: String,
}

/// Parse a mount-relative path such as `/node_modules/bundle-free/lit/x.js`.
///
/// Returns `None` for paths outside the namespace, invalid package names and
/// sub-paths containing `..` segments.
#[must_use]
pub fn parse_module_request(path: &str) -> Option<ModuleRequest<'_>> {
    let rest = path
        .trim_start_matches('/')
        .strip_prefix(MODULES_NAMESPACE)?
        .strip_prefix('/')?;

    let name_len = if rest.starts_with('@') {
        let scope_end = rest.find('/')?;
        scope_end + 1 + rest[scope_end + 1..].find('/').unwrap_or(rest.len() - scope_end - 1)
    } else {
        rest.find('/').unwrap_or(rest.len())
    };
    let (name, tail) = rest.split_at(name_len);
    if !is_valid_package_name(name) {
        return None;
    }

    let tail = tail.trim_start_matches('/');
    if tail.split('/').any(|segment| segment == ".." || segment == ".") {
        return None;
    }
    let subpath = if tail.is_empty() {
        ROOT.to_string()
    } else {
        format!("./{tail}")
    };

    Some(ModuleRequest { name, subpath })
}

/// Per-configuration resolution state.
#[derive(Debug)]
pub struct ResolutionContext {
    store: DescriptorStore,
    cache: TranscodeCache,
    build: ImportMapBuild,
    patcher: HtmlPatcher,
    mount: String,
}

impl ResolutionContext {
    /// Build the context for a project directory.
    ///
    /// Locates `node_modules` from `project_dir`, loads every requested
    /// package and builds the import map. Fails when a requested package
    /// cannot be loaded.
    pub async fn from_config(project_dir: &Path, config: &BundleFreeConfig) -> Result<Self> {
        let root = find_node_modules_root(project_dir)?;
        let bundler = Arc::new(CommandBundler::new(
            config.bundler.command.clone(),
            project_dir,
        ));
        Self::new(root, config, bundler).await
    }

    /// Build the context for a known `node_modules` directory and bundler.
    pub async fn new(
        root: PathBuf,
        config: &BundleFreeConfig,
        bundler: Arc<dyn Bundler>,
    ) -> Result<Self> {
        config.warn_if_production();

        let store = DescriptorStore::new(root.clone());
        let build = importmap::build(&config.modules, &store).await?;
        info!(
            root = %root.display(),
            packages = build.exported.len(),
            "import map ready"
        );

        let patcher = HtmlPatcher::new(
            build.import_map.clone(),
            PatchOptions {
                module_names: build.module_names.clone(),
                overlay: config.overlay,
                livereload: config.livereload.port(),
                replace: config.replace.clone(),
            },
        )?;

        let cache = TranscodeCache::new(root, &config.vendor, bundler)
            .with_prebundle_shim(config.prebundle_shim);

        Ok(Self {
            store,
            cache,
            build,
            patcher,
            mount: config.mount_path(),
        })
    }

    /// The `node_modules` directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.store.root()
    }

    /// The configured mount path.
    #[must_use]
    pub fn mount(&self) -> &str {
        &self.mount
    }

    #[must_use]
    pub fn store(&self) -> &DescriptorStore {
        &self.store
    }

    #[must_use]
    pub fn cache(&self) -> &TranscodeCache {
        &self.cache
    }

    /// Import map with `{{base}}` placeholders.
    #[must_use]
    pub fn import_map(&self) -> &ImportMap {
        &self.build.import_map
    }

    /// A package served under the resolved-modules namespace.
    #[must_use]
    pub fn exported(&self, name: &str) -> Option<&ExportedPackage> {
        self.build.exported.get(name)
    }

    #[must_use]
    pub fn patcher(&self) -> &HtmlPatcher {
        &self.patcher
    }

    /// Patch an HTML document served under `mount`.
    #[must_use]
    pub fn patch_html(&self, mount: &str, html: &str) -> String {
        self.patcher.patch(mount, html)
    }

    /// Decide how to serve a mount-relative request path.
    ///
    /// Packages resolving under "import" are redirected to their file in
    /// `node_modules`. Otherwise the request is rewritten to a transcoded
    /// copy in the cache. Requests that cannot be served pass through.
    pub async fn route(&self, mount: &str, path: &str) -> RouteDecision {
        let Some(request) = parse_module_request(path) else {
            return RouteDecision::PassThrough;
        };
        let Some(package) = self.exported(request.name) else {
            debug!(package = request.name, "not an exported package");
            return RouteDecision::PassThrough;
        };
        let mount = crate::config::normalize_base(mount);
        let descriptor = &package.descriptor;

        if package.prebundle == Some(BundleKind::NeedsPrebundle) && request.subpath == ROOT {
            if let Some(url) = self.cache.get_or_create_prebundle(descriptor).await {
                return RouteDecision::Rewrite(format!("{mount}{url}"));
            }
        }

        let import = ResolutionKind::Import.conditions();
        if let Some(file) = resolve_export(descriptor, Some(&request.subpath), import) {
            let file = file.trim_start_matches("./");
            return RouteDecision::Redirect(format!(
                "{mount}{NODE_MODULES}/{}/{file}",
                request.name
            ));
        }

        match self
            .cache
            .get_or_create(descriptor, Some(&request.subpath), true)
            .await
        {
            Some(url) => RouteDecision::Rewrite(format!("{mount}{url}")),
            None => RouteDecision::PassThrough,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModuleSpec;
    use crate::error::TranscodeError;
    use futures::future::BoxFuture;
    use serde_json::json;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Debug, Default)]
    struct CopyBundler {
        calls: AtomicUsize,
    }

    impl Bundler for CopyBundler {
        fn bundle<'a>(
            &'a self,
            entry: &'a Path,
            output: &'a Path,
        ) -> BoxFuture<'a, std::result::Result<(), TranscodeError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::fs::copy(entry, output)
                    .await
                    .map(|_| ())
                    .map_err(|e| TranscodeError::Bundler {
                        message: e.to_string(),
                    })
            })
        }
    }

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn project() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let nm = dir.path().join("node_modules");
        write(
            &nm,
            "kit/package.json",
            &json!({
                "name": "kit", "version": "1.0.0",
                "exports": { ".": { "import": "./esm/index.js" }, "./legacy": { "require": "./cjs/legacy.js" } },
                "dependencies": { "old": "1" }
            })
            .to_string(),
        );
        write(&nm, "kit/cjs/legacy.js", "exports.x = 1;");
        write(
            &nm,
            "old/package.json",
            &json!({ "name": "old", "version": "0.1.0", "main": "./index.js" }).to_string(),
        );
        write(&nm, "old/index.js", "module.exports = { a, b };");
        write(
            &nm,
            "@scope/bare/package.json",
            &json!({
                "name": "@scope/bare", "version": "2.0.0",
                "exports": { "import": "./index.js" },
                "dependencies": { "old": "1" }
            })
            .to_string(),
        );
        write(&nm, "@scope/bare/index.js", "export * from 'old';");
        dir
    }

    async fn context(dir: &TempDir, bundler: Arc<CopyBundler>) -> ResolutionContext {
        let config = BundleFreeConfig {
            base: "/app".to_string(),
            modules: vec![ModuleSpec::from("kit"), ModuleSpec::from("@scope/bare")],
            ..BundleFreeConfig::default()
        };
        ResolutionContext::new(dir.path().join("node_modules"), &config, bundler)
            .await
            .unwrap()
    }

    #[test]
    fn test_parse_module_request() {
        let req = parse_module_request("/node_modules/bundle-free/lit").unwrap();
        assert_eq!((req.name, req.subpath.as_str()), ("lit", "."));

        let req = parse_module_request("/node_modules/bundle-free/lit/").unwrap();
        assert_eq!(req.subpath, ".");

        let req = parse_module_request("node_modules/bundle-free/lit/dir/x.js").unwrap();
        assert_eq!((req.name, req.subpath.as_str()), ("lit", "./dir/x.js"));

        let req = parse_module_request("/node_modules/bundle-free/@scope/pkg/util").unwrap();
        assert_eq!((req.name, req.subpath.as_str()), ("@scope/pkg", "./util"));

        let req = parse_module_request("/node_modules/bundle-free/@scope/pkg").unwrap();
        assert_eq!((req.name, req.subpath.as_str()), ("@scope/pkg", "."));
    }

    #[test]
    fn test_parse_module_request_rejects() {
        assert!(parse_module_request("/index.html").is_none());
        assert!(parse_module_request("/node_modules/lit/index.js").is_none());
        assert!(parse_module_request("/node_modules/bundle-free/@overlay.js").is_none());
        assert!(parse_module_request("/node_modules/bundle-free/lit/../../secret").is_none());
        assert!(parse_module_request("/node_modules/bundle-free/../x").is_none());
        assert!(parse_module_request("/node_modules/bundle-freeish/lit").is_none());
    }

    #[tokio::test]
    async fn test_redirect_to_es_entry() {
        let dir = project();
        let ctx = context(&dir, Arc::default()).await;
        assert_eq!(
            ctx.route("/app/", "/node_modules/bundle-free/kit").await,
            RouteDecision::Redirect("/app/node_modules/kit/esm/index.js".to_string())
        );
    }

    #[tokio::test]
    async fn test_rewrite_legacy_subpath_to_cache() {
        let dir = project();
        let bundler = Arc::new(CopyBundler::default());
        let ctx = context(&dir, bundler.clone()).await;

        let decision = ctx.route("/app", "/node_modules/bundle-free/kit/legacy").await;
        let RouteDecision::Rewrite(url) = decision else {
            panic!("expected rewrite, got {decision:?}");
        };
        let key = TranscodeCache::cache_key("kit", "1.0.0", "./cjs/legacy.js");
        assert_eq!(
            url,
            format!("/app/node_modules/@bundle-free/bundle-free/cache/{key}.js")
        );
        assert!(ctx.cache().cache_dir().join(format!("{key}.js")).is_file());

        // Served from the cache the second time
        ctx.route("/app", "/node_modules/bundle-free/kit/legacy").await;
        assert_eq!(bundler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closure_member_is_transcoded() {
        let dir = project();
        let ctx = context(&dir, Arc::default()).await;
        let decision = ctx.route("/app/", "/node_modules/bundle-free/old").await;
        assert!(matches!(decision, RouteDecision::Rewrite(url) if url.starts_with("/app/node_modules/@bundle-free/bundle-free/cache/")));
    }

    #[tokio::test]
    async fn test_prebundle_for_bare_package_with_legacy_deps() {
        let dir = project();
        let ctx = context(&dir, Arc::default()).await;
        assert_eq!(
            ctx.exported("@scope/bare").unwrap().prebundle,
            Some(BundleKind::NeedsPrebundle)
        );

        let decision = ctx.route("/app/", "/node_modules/bundle-free/@scope/bare").await;
        match decision {
            RouteDecision::Rewrite(url) => {
                assert!(url.starts_with("/app/node_modules/@bundle-free/bundle-free/cache/"));
            }
            other => panic!("expected rewrite, got {other:?}"),
        }

        // Dependencies of the bundled package stay out of the import map
        assert!(ctx.import_map().get("@scope/bare/").is_some());
    }

    #[tokio::test]
    async fn test_native_bare_dependencies_are_routable() {
        let dir = project();
        let nm = dir.path().join("node_modules");
        write(
            &nm,
            "pure/package.json",
            &json!({
                "name": "pure", "version": "1.0.0", "type": "module",
                "exports": "./index.js",
                "dependencies": { "es-dep": "1" }
            })
            .to_string(),
        );
        write(&nm, "pure/index.js", "export * from 'es-dep';");
        write(
            &nm,
            "es-dep/package.json",
            &json!({ "name": "es-dep", "version": "1.0.0", "type": "module", "exports": "./index.js" })
                .to_string(),
        );
        let config = BundleFreeConfig {
            modules: vec![ModuleSpec::from("pure")],
            ..BundleFreeConfig::default()
        };
        let bundler = Arc::new(CopyBundler::default());
        let ctx = ResolutionContext::new(nm, &config, bundler.clone())
            .await
            .unwrap();

        assert_eq!(
            ctx.exported("pure").unwrap().prebundle,
            Some(BundleKind::NativeBare)
        );
        assert_eq!(
            ctx.route("/", "/node_modules/bundle-free/pure").await,
            RouteDecision::Redirect("/node_modules/pure/index.js".to_string())
        );
        assert!(ctx.import_map().get("es-dep").is_some());
        assert_eq!(
            ctx.route("/", "/node_modules/bundle-free/es-dep").await,
            RouteDecision::Redirect("/node_modules/es-dep/index.js".to_string())
        );
        assert_eq!(bundler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pass_through() {
        let dir = project();
        let ctx = context(&dir, Arc::default()).await;
        // Unknown package
        assert_eq!(
            ctx.route("/app/", "/node_modules/bundle-free/react").await,
            RouteDecision::PassThrough
        );
        // Not a module request
        assert_eq!(ctx.route("/app/", "/index.html").await, RouteDecision::PassThrough);
        // Traversal
        assert_eq!(
            ctx.route("/app/", "/node_modules/bundle-free/kit/../../etc/passwd").await,
            RouteDecision::PassThrough
        );
        // Sub-path the package does not export
        assert_eq!(
            ctx.route("/app/", "/node_modules/bundle-free/kit/missing").await,
            RouteDecision::PassThrough
        );
    }

    #[tokio::test]
    async fn test_patch_html_uses_request_mount() {
        let dir = project();
        let ctx = context(&dir, Arc::default()).await;
        assert_eq!(ctx.mount(), "/app/");

        let html = ctx.patch_html("/other/", "<head></head><body></body>");
        assert!(html.contains("\"kit\": \"/other/node_modules/bundle-free/kit\""));
        assert!(html.contains("\"old\": \"/other/node_modules/bundle-free/old\""));
        assert!(html.contains("\"@scope/bare/\""));
    }

    #[tokio::test]
    async fn test_missing_module_aborts_context() {
        let dir = project();
        let config = BundleFreeConfig {
            modules: vec![ModuleSpec::from("not-installed")],
            ..BundleFreeConfig::default()
        };
        let err = ResolutionContext::new(
            dir.path().join("node_modules"),
            &config,
            Arc::new(CopyBundler::default()),
        )
        .await
        .unwrap_err();
        assert!(err.is_descriptor_failure());
    }
}
