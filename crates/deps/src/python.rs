use crate::error::Result;
use crate::manifest::ManifestKind;
use crate::runner::{install_or_suggest, Installer};
use crate::{DependencyResolver, ManifestContext, ReconcileReport, ResolverOptions};
use async_trait::async_trait;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Top-level standard-library modules.
pub const PYTHON_STDLIB: &[&str] = &[
    "__future__", "abc", "argparse", "array", "ast", "asyncio", "atexit", "base64", "binascii",
    "bisect", "builtins", "bz2", "calendar", "cmath", "codecs", "collections", "colorsys",
    "concurrent", "configparser", "contextlib", "contextvars", "copy", "copyreg", "csv", "ctypes",
    "dataclasses", "datetime", "decimal", "difflib", "dis", "doctest", "email", "enum", "errno",
    "faulthandler", "fcntl", "filecmp", "fileinput", "fnmatch", "fractions", "ftplib",
    "functools", "gc", "getopt", "getpass", "gettext", "glob", "graphlib", "gzip", "hashlib",
    "heapq", "hmac", "html", "http", "imaplib", "importlib", "inspect", "io", "ipaddress",
    "itertools", "json", "keyword", "linecache", "locale", "logging", "lzma", "mailbox",
    "marshal", "math", "mimetypes", "mmap", "multiprocessing", "netrc", "numbers", "operator",
    "os", "pathlib", "pdb", "pickle", "pkgutil", "platform", "plistlib", "poplib", "posixpath",
    "pprint", "profile", "pstats", "queue", "quopri", "random", "re", "reprlib", "resource",
    "sched", "secrets", "select", "selectors", "shelve", "shlex", "shutil", "signal", "site",
    "smtplib", "socket", "socketserver", "sqlite3", "ssl", "stat", "statistics", "string",
    "stringprep", "struct", "subprocess", "sys", "sysconfig", "syslog", "tarfile", "tempfile",
    "termios", "textwrap", "threading", "time", "timeit", "tkinter", "token", "tokenize",
    "tomllib", "trace", "traceback", "tracemalloc", "tty", "types", "typing", "unicodedata",
    "unittest", "urllib", "uuid", "venv", "warnings", "wave", "weakref", "webbrowser", "winreg",
    "wsgiref", "xml", "xmlrpc", "zipapp", "zipfile", "zipimport", "zlib", "zoneinfo",
];

const KIND: ManifestKind = ManifestKind {
    file_names: &["pyproject.toml"],
    placeholder: "config",
    absent_text: "",
};

const POETRY: Installer = Installer {
    program: "poetry",
    args: &["add"],
};

const UV: Installer = Installer {
    program: "uv",
    args: &["add"],
};

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*import[ \t]+([A-Za-z0-9_.,\t ]+?)[ \t]*(?:#.*)?$").expect("import regex")
});
static FROM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*from[ \t]+(\.*[A-Za-z0-9_.]*)[ \t]+import\b").expect("from regex")
});
static REQUIREMENT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z0-9][A-Za-z0-9._-]*)").expect("requirement regex"));

/// PEP 503-style comparison key, also folding `.`/`-` to the `_` used by import names.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace(['-', '.'], "_")
}

/// `pyproject.toml` + `poetry add` / `uv add`.
#[derive(Debug, Clone)]
pub struct PythonResolver {
    options: ResolverOptions,
}

impl PythonResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self { options }
    }

    /// Normalised names of everything the project declares, plus the stdlib.
    pub fn declared_packages(manifest_text: &str) -> Result<BTreeSet<String>> {
        let doc: toml::Table = toml::from_str(manifest_text)?;
        let mut declared: BTreeSet<String> =
            PYTHON_STDLIB.iter().map(|name| normalize_name(name)).collect();

        if let Some(project) = doc.get("project") {
            if let Some(name) = project.get("name").and_then(toml::Value::as_str) {
                declared.insert(normalize_name(name));
            }
            declared.extend(requirement_names(project.get("dependencies")));
            if let Some(optional) = project
                .get("optional-dependencies")
                .and_then(toml::Value::as_table)
            {
                for extra in optional.values() {
                    declared.extend(requirement_names(Some(extra)));
                }
            }
        }

        if let Some(groups) = doc.get("dependency-groups").and_then(toml::Value::as_table) {
            for group in groups.values() {
                declared.extend(requirement_names(Some(group)));
            }
        }

        if let Some(poetry) = doc.get("tool").and_then(|tool| tool.get("poetry")) {
            if let Some(name) = poetry.get("name").and_then(toml::Value::as_str) {
                declared.insert(normalize_name(name));
            }
            for table in ["dependencies", "dev-dependencies"] {
                declared.extend(poetry_keys(poetry.get(table)));
            }
            if let Some(groups) = poetry.get("group").and_then(toml::Value::as_table) {
                for group in groups.values() {
                    declared.extend(poetry_keys(group.get("dependencies")));
                }
            }
        }
        Ok(declared)
    }

    /// Normalised top-level module ⇒ name as written; relative imports are skipped.
    #[must_use]
    pub fn used_modules(code: &str) -> BTreeMap<String, String> {
        let joined = code.replace("\\\r\n", " ").replace("\\\n", " ");
        let mut used = BTreeMap::new();
        let mut record = |module: &str| {
            let root = module.trim().split('.').next().unwrap_or_default();
            if !root.is_empty() && !module.trim().starts_with('.') {
                used.entry(normalize_name(root))
                    .or_insert_with(|| root.to_string());
            }
        };
        for cap in IMPORT_RE.captures_iter(&joined) {
            for item in cap[1].split(',') {
                let module = item.split_whitespace().next().unwrap_or_default();
                record(module);
            }
        }
        for cap in FROM_RE.captures_iter(&joined) {
            record(&cap[1]);
        }
        used
    }

    pub fn missing_packages(manifest_text: &str, code: &str) -> Result<Vec<String>> {
        let declared = Self::declared_packages(manifest_text)?;
        Ok(Self::used_modules(code)
            .into_iter()
            .filter(|(key, _)| !declared.contains(key))
            .map(|(_, name)| name)
            .collect())
    }

    /// Poetry wins over uv; neither means report-only.
    fn installer_for(manifest_text: &str) -> Option<Installer> {
        let doc: toml::Table = toml::from_str(manifest_text).ok()?;
        let tool = doc.get("tool")?;
        if tool.get("poetry").is_some() {
            Some(POETRY)
        } else if tool.get("uv").is_some() {
            Some(UV)
        } else {
            None
        }
    }
}

fn requirement_names(value: Option<&toml::Value>) -> Vec<String> {
    value
        .and_then(toml::Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(toml::Value::as_str)
        .filter_map(|req| REQUIREMENT_NAME_RE.captures(req))
        .map(|cap| normalize_name(&cap[1]))
        .collect()
}

fn poetry_keys(value: Option<&toml::Value>) -> Vec<String> {
    value
        .and_then(toml::Value::as_table)
        .into_iter()
        .flat_map(|table| table.keys())
        .filter(|key| key.as_str() != "python")
        .map(|key| normalize_name(key))
        .collect()
}

#[async_trait]
impl DependencyResolver for PythonResolver {
    fn name(&self) -> &'static str {
        "python"
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
            debug!("No pyproject.toml found; skipping dependency reconciliation");
            return ReconcileReport::Skipped;
        };
        match Self::missing_packages(manifest_text, generated_code) {
            Ok(missing) => {
                let installer = Self::installer_for(manifest_text);
                install_or_suggest(&self.options, installer, manifest, missing).await
            }
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
    use crate::{Resolution, Suggestion};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const PEP621: &str = r#"
        [project]
        name = "my.tool"
        dependencies = ["requests>=2.31", "PyYAML ; python_version > '3.8'", "typing-extensions"]
        [project.optional-dependencies]
        dev = ["pytest==8.*"]
        [dependency-groups]
        lint = ["ruff"]
    "#;

    const POETRY_TOML: &str = r#"
        [tool.poetry]
        name = "svc"
        [tool.poetry.dependencies]
        python = "^3.11"
        httpx = "^0.27"
        [tool.poetry.group.test.dependencies]
        pytest-asyncio = "*"
    "#;

    #[test]
    fn import_forms_and_relative_imports() {
        let code = "import os, sys as system\nimport numpy.linalg  # math\nfrom requests.adapters import HTTPAdapter\nfrom . import sibling\nfrom .pkg import thing\nimport a.b, \\\n    c\n";
        let used: Vec<_> = PythonResolver::used_modules(code).into_values().collect();
        assert_eq!(used, vec!["a", "c", "numpy", "os", "requests", "sys"]);
    }

    #[test]
    fn pep621_names_are_normalised() {
        let code = "import requests\nimport typing_extensions\nimport my_tool\nimport pytest\nimport ruff\nimport pandas\nimport json";
        assert_eq!(
            PythonResolver::missing_packages(PEP621, code).expect("parse"),
            vec!["pandas".to_string()]
        );
    }

    #[test]
    fn poetry_groups_count_and_python_key_is_ignored() {
        let code = "import httpx\nimport pytest_asyncio\nimport svc.core\nfrom python import x";
        assert_eq!(
            PythonResolver::missing_packages(POETRY_TOML, code).expect("parse"),
            vec!["python".to_string()]
        );
    }

    #[tokio::test]
    async fn poetry_projects_install_with_poetry() {
        let runner = Arc::new(RecordingRunner::default());
        let options = ResolverOptions {
            runner: runner.clone(),
            ..ResolverOptions::default()
        };
        let report = PythonResolver::new(options)
            .reconcile(Some(Path::new("/w/pyproject.toml")), POETRY_TOML, "import rich")
            .await;
        assert_eq!(
            report,
            ReconcileReport::Installed {
                names: vec!["rich".into()]
            }
        );
        assert_eq!(runner.calls()[0].0, "poetry");
    }

    #[tokio::test]
    async fn uv_projects_install_with_uv_and_plain_projects_only_report() {
        let runner = Arc::new(RecordingRunner::default());
        let options = ResolverOptions {
            runner: runner.clone(),
            ..ResolverOptions::default()
        };
        let resolver = PythonResolver::new(options);

        let uv = "[project]\nname = \"x\"\n[tool.uv]\ndev-dependencies = []\n";
        resolver
            .reconcile(Some(Path::new("/w/pyproject.toml")), uv, "import rich")
            .await;
        assert_eq!(runner.calls()[0].0, "uv");

        let report = resolver
            .reconcile(Some(Path::new("/w/pyproject.toml")), PEP621, "import rich")
            .await;
        assert_eq!(
            report,
            ReconcileReport::Suggested {
                suggestions: vec![Suggestion {
                    identifier: "rich".into(),
                    resolution: Resolution::AddManually { command: None },
                }]
            }
        );
        assert_eq!(runner.calls().len(), 1);
    }
}
