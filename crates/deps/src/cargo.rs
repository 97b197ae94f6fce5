use crate::error::Result;
use crate::manifest::ManifestKind;
use crate::runner::{install_or_suggest, Installer};
use crate::{DependencyResolver, ManifestContext, ReconcileReport, ResolverOptions};
use async_trait::async_trait;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;

/// Path roots that never name an external crate.
pub const NON_EXTERNAL_ROOTS: &[&str] = &[
    "std",
    "core",
    "alloc",
    "proc_macro",
    "test",
    "crate",
    "self",
    "super",
];

const DEPENDENCY_TABLES: &[&str] = &["dependencies", "dev-dependencies", "build-dependencies"];

const KIND: ManifestKind = ManifestKind {
    file_names: &["Cargo.toml"],
    placeholder: "cargo_toml",
    absent_text: "",
};

const INSTALLER: Installer = Installer {
    program: "cargo",
    args: &["add"],
};

static USE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:pub\s*(?:\([^)]*\)\s*)?)?\buse\s+(?:::)?([A-Za-z_][A-Za-z0-9_]*)\s*(?:::|;|\s+as\s)")
        .expect("use regex")
});
static BRACE_USE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\buse\s*(?:::)?\{([^}]+)\}\s*;").expect("brace use regex"));
static EXTERN_CRATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bextern\s+crate\s+([A-Za-z_][A-Za-z0-9_]*)").expect("extern crate regex")
});
static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"));

/// `Cargo.toml` + `cargo add`.
#[derive(Debug, Clone)]
pub struct CargoResolver {
    options: ResolverOptions,
}

impl CargoResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self { options }
    }

    /// Declared crate names with `-` folded to `_`, plus the non-external roots.
    pub fn declared_crates(manifest_text: &str) -> Result<BTreeSet<String>> {
        let doc: toml::Table = toml::from_str(manifest_text)?;
        let mut declared: BTreeSet<String> =
            NON_EXTERNAL_ROOTS.iter().map(|root| root.to_string()).collect();

        let mut add = |name: &str| {
            declared.insert(name.replace('-', "_"));
        };
        if let Some(name) = doc
            .get("package")
            .and_then(|pkg| pkg.get("name"))
            .and_then(toml::Value::as_str)
        {
            add(name);
        }
        if let Some(lib_name) = doc
            .get("lib")
            .and_then(|lib| lib.get("name"))
            .and_then(toml::Value::as_str)
        {
            add(lib_name);
        }
        for table in DEPENDENCY_TABLES {
            for key in table_keys(doc.get(*table)) {
                add(key);
            }
        }
        if let Some(workspace) = doc.get("workspace") {
            for key in table_keys(workspace.get("dependencies")) {
                add(key);
            }
        }
        if let Some(targets) = doc.get("target").and_then(toml::Value::as_table) {
            for target in targets.values() {
                for table in DEPENDENCY_TABLES {
                    for key in table_keys(target.get(*table)) {
                        add(key);
                    }
                }
            }
        }
        Ok(declared)
    }

    /// Crate roots named by `use` and `extern crate` statements.
    #[must_use]
    pub fn used_crates(code: &str) -> BTreeSet<String> {
        let mut used = BTreeSet::new();
        for cap in USE_RE.captures_iter(code) {
            used.insert(cap[1].to_string());
        }
        for cap in BRACE_USE_RE.captures_iter(code) {
            for item in cap[1].split(',') {
                let root = item.trim().split("::").next().unwrap_or_default().trim();
                if IDENT_RE.is_match(root) {
                    used.insert(root.to_string());
                }
            }
        }
        for cap in EXTERN_CRATE_RE.captures_iter(code) {
            used.insert(cap[1].to_string());
        }
        used
    }

    pub fn missing_crates(manifest_text: &str, code: &str) -> Result<Vec<String>> {
        let declared = Self::declared_crates(manifest_text)?;
        Ok(Self::used_crates(code)
            .into_iter()
            .filter(|name| !declared.contains(name))
            .collect())
    }
}

fn table_keys(value: Option<&toml::Value>) -> impl Iterator<Item = &str> {
    value
        .and_then(toml::Value::as_table)
        .into_iter()
        .flat_map(|table| table.keys().map(String::as_str))
}

#[async_trait]
impl DependencyResolver for CargoResolver {
    fn name(&self) -> &'static str {
        "cargo"
    }

    async fn extract_manifest_context(
        &self,
        target: &Path,
        root: &Path,
        prompt: &str,
    ) -> ManifestContext {
        KIND.context(target, root, prompt).await
    }

    async fn reconcile(
        &self,
        manifest: Option<&Path>,
        manifest_text: &str,
        generated_code: &str,
    ) -> ReconcileReport {
        let Some(manifest) = manifest else {
            debug!("No Cargo.toml found; skipping dependency reconciliation");
            return ReconcileReport::Skipped;
        };
        let missing = match Self::missing_crates(manifest_text, generated_code) {
            Ok(missing) => missing,
            Err(err) => {
                warn!("Could not parse {}: {err}", manifest.display());
                return ReconcileReport::ManifestUnreadable {
                    detail: err.to_string(),
                };
            }
        };
        // cargo add wants the published name.
        let names = missing.into_iter().map(|c| c.replace('_', "-")).collect();
        install_or_suggest(&self.options, Some(INSTALLER), manifest, names).await
    }
}
