use crate::error::{DepsError, Result};
use crate::manifest::ManifestKind;
use crate::runner::{install_or_suggest, Installer};
use crate::{DependencyResolver, ManifestContext, ReconcileReport, ResolverOptions};
use async_trait::async_trait;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;

/// Node's built-in modules (importable with or without the `node:` prefix).
pub const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

const DEPENDENCY_FIELDS: &[&str] = &[
    "dependencies",
    "devDependencies",
    "peerDependencies",
    "optionalDependencies",
];

const KIND: ManifestKind = ManifestKind {
    file_names: &["package.json"],
    placeholder: "package_json",
    absent_text: "",
};

const INSTALLER: Installer = Installer {
    program: "npm",
    args: &["install"],
};

static SPECIFIER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // import x from "m"; import { a, b } from "m"; import type T from "m"
        r#"\bimport\s+(?:type\s+)?[\w*{}\s,$]+?\s+from\s*["']([^"'\n]+)["']"#,
        // import "m";
        r#"\bimport\s*["']([^"'\n]+)["']"#,
        // export { a } from "m"; export * from "m"
        r#"\bexport\s+(?:type\s+)?[\w*{}\s,$]+?\s+from\s*["']([^"'\n]+)["']"#,
        // require("m"), import("m")
        r#"\b(?:require|import)\s*\(\s*["']([^"'\n]+)["']\s*\)"#,
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("import specifier regex"))
    .collect()
});

/// `package.json` + `npm install`.
#[derive(Debug, Clone)]
pub struct NpmResolver {
    options: ResolverOptions,
}

impl NpmResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self { options }
    }

    pub fn declared_packages(manifest_text: &str) -> Result<BTreeSet<String>> {
        let doc: serde_json::Value = serde_json::from_str(manifest_text)?;
        let Some(doc) = doc.as_object() else {
            return Err(DepsError::UnexpectedShape {
                expected: "JSON object",
            });
        };

        let mut declared: BTreeSet<String> =
            NODE_BUILTINS.iter().map(|name| name.to_string()).collect();
        if let Some(name) = doc.get("name").and_then(serde_json::Value::as_str) {
            declared.insert(name.to_string());
        }
        for field in DEPENDENCY_FIELDS {
            if let Some(deps) = doc.get(*field).and_then(serde_json::Value::as_object) {
                declared.extend(deps.keys().cloned());
            }
        }
        Ok(declared)
    }

    /// Package names imported by `code`; relative and `node:` specifiers are dropped.
    #[must_use]
    pub fn used_packages(code: &str) -> BTreeSet<String> {
        SPECIFIER_PATTERNS
            .iter()
            .flat_map(|re| re.captures_iter(code))
            .filter_map(|cap| package_of(&cap[1]))
            .collect()
    }

    pub fn missing_packages(manifest_text: &str, code: &str) -> Result<Vec<String>> {
        let declared = Self::declared_packages(manifest_text)?;
        Ok(Self::used_packages(code)
            .into_iter()
            .filter(|name| !declared.contains(name))
            .collect())
    }
}

/// `@scope/pkg/deep` ⇒ `@scope/pkg`, `pkg/deep` ⇒ `pkg`.
fn package_of(specifier: &str) -> Option<String> {
    let specifier = specifier.trim();
    if specifier.is_empty()
        || specifier.starts_with('.')
        || specifier.starts_with('/')
        || specifier.starts_with("node:")
        || specifier.contains("://")
    {
        return None;
    }
    let mut parts = specifier.split('/');
    let first = parts.next()?;
    if let Some(scope) = first.strip_prefix('@') {
        let name = parts.next().filter(|name| !name.is_empty())?;
        if scope.is_empty() {
            return None;
        }
        return Some(format!("{first}/{name}"));
    }
    Some(first.to_string())
}

#[async_trait]
impl DependencyResolver for NpmResolver {
    fn name(&self) -> &'static str {
        "npm"
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
            debug!("No package.json found; skipping dependency reconciliation");
            return ReconcileReport::Skipped;
        };
        match Self::missing_packages(manifest_text, generated_code) {
            Ok(missing) => install_or_suggest(&self.options, Some(INSTALLER), manifest, missing).await,
            Err(err) => {
                warn!("Could not parse {}: {err}", manifest.display());
                ReconcileReport::ManifestUnreadable {
                    detail: err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::RecordingRunner;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const PACKAGE_JSON: &str = r#"{
        "name": "@acme/web",
        "dependencies": { "react": "^18.0.0" },
        "devDependencies": { "@types/node": "^20" },
        "peerDependencies": { "react-dom": "^18" },
        "optionalDependencies": { "fsevents": "*" }
    }"#;

    #[test]
    fn every_import_form_is_recognised() {
        let code = r#"
            import React, { useState } from "react";
            import type { Props } from './props';
            import {
                a,
                b,
            } from "lodash/fp";
            import "@fontsource/inter/400.css";
            export * from "zod";
            const fs = require('fs/promises');
            const chalk = require("chalk");
            const lazy = await import("@tanstack/query");
            import { readFile } from "node:fs/promises";
        "#;
        let used: Vec<_> = NpmResolver::used_packages(code).into_iter().collect();
        assert_eq!(
            used,
            vec![
                "@fontsource/inter",
                "@tanstack/query",
                "chalk",
                "fs",
                "lodash",
                "react",
                "zod"
            ]
        );
    }

    #[test]
    fn declared_builtin_and_own_packages_are_not_missing() {
        let code = r#"
            import React from "react";
            import { createRoot } from "react-dom/client";
            import type { Buffer } from "@types/node";
            import path from "path";
            import { x } from "@acme/web/internal";
            import { z } from "zod";
        "#;
        assert_eq!(
            NpmResolver::missing_packages(PACKAGE_JSON, code).expect("parse"),
            vec!["zod".to_string()]
        );
    }

    #[test]
    fn non_object_manifest_is_rejected() {
        assert!(matches!(
            NpmResolver::declared_packages("[1, 2]"),
            Err(DepsError::UnexpectedShape { .. })
        ));
        assert!(matches!(
            NpmResolver::declared_packages("{ nope"),
            Err(DepsError::JsonError(_))
        ));
    }

    #[tokio::test]
    async fn installs_with_npm_in_manifest_dir() {
        let runner = Arc::new(RecordingRunner::default());
        let options = ResolverOptions {
            runner: runner.clone(),
            ..ResolverOptions::default()
        };
        let report = NpmResolver::new(options)
            .reconcile(
                Some(Path::new("/w/web/package.json")),
                PACKAGE_JSON,
                "import axios from 'axios';",
            )
            .await;
        assert_eq!(
            report,
            ReconcileReport::Installed {
                names: vec!["axios".into()]
            }
        );
        let calls = runner.calls();
        assert_eq!(calls[0].0, "npm");
        assert_eq!(calls[0].1, vec!["install", "axios"]);
        assert_eq!(calls[0].2, Path::new("/w/web"));
    }
}
