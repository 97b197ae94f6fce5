use crate::error::{DepsError, Result};
use crate::manifest::ManifestKind;
use crate::runner::{install_or_suggest, Installer};
use crate::{DependencyResolver, ManifestContext, ReconcileReport, ResolverOptions};
use async_trait::async_trait;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;
use std::collections::BTreeSet;
use std::path::Path;

pub const DART_BUILTINS: &[&str] = &["flutter", "flutter_test"];

const DEPENDENCY_SECTIONS: &[&str] = &["dependencies", "dev_dependencies", "dependency_overrides"];

const KIND: ManifestKind = ManifestKind {
    file_names: &["pubspec.yaml"],
    placeholder: "pubspec",
    absent_text: "",
};

const FLUTTER_PUB_ADD: Installer = Installer {
    program: "flutter",
    args: &["pub", "add"],
};

const DART_PUB_ADD: Installer = Installer {
    program: "dart",
    args: &["pub", "add"],
};

static PACKAGE_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:import|export)\s+['"]package:([A-Za-z0-9_]+)/"#).expect("package import regex")
});

/// `pubspec.yaml` + `flutter pub add` (or `dart pub add` outside Flutter).
#[derive(Debug, Clone)]
pub struct PubResolver {
    options: ResolverOptions,
}

impl PubResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self { options }
    }

    fn parse(manifest_text: &str) -> Result<Value> {
        let doc: Value = serde_yaml::from_str(manifest_text)?;
        if doc.is_null() {
            return Ok(Value::Mapping(Default::default()));
        }
        if !doc.is_mapping() {
            return Err(DepsError::UnexpectedShape {
                expected: "YAML mapping",
            });
        }
        Ok(doc)
    }

    pub fn declared_packages(manifest_text: &str) -> Result<BTreeSet<String>> {
        let doc = Self::parse(manifest_text)?;
        let mut declared: BTreeSet<String> =
            DART_BUILTINS.iter().map(|name| name.to_string()).collect();
        if let Some(name) = doc.get("name").and_then(Value::as_str) {
            declared.insert(name.to_string());
        }
        for section in DEPENDENCY_SECTIONS {
            if let Some(deps) = doc.get(*section).and_then(Value::as_mapping) {
                declared.extend(deps.keys().filter_map(Value::as_str).map(str::to_string));
            }
        }
        Ok(declared)
    }

    #[must_use]
    pub fn used_packages(code: &str) -> BTreeSet<String> {
        PACKAGE_IMPORT_RE
            .captures_iter(code)
            .map(|cap| cap[1].to_string())
            .collect()
    }

    pub fn missing_packages(manifest_text: &str, code: &str) -> Result<Vec<String>> {
        let declared = Self::declared_packages(manifest_text)?;
        Ok(Self::used_packages(code)
            .into_iter()
            .filter(|name| !declared.contains(name))
            .collect())
    }

    fn installer_for(manifest_text: &str) -> Installer {
        let uses_flutter = Self::parse(manifest_text)
            .ok()
            .map(|doc| {
                doc.get("flutter").is_some()
                    || doc
                        .get("dependencies")
                        .and_then(|deps| deps.get("flutter"))
                        .is_some()
            })
            .unwrap_or(false);
        if uses_flutter {
            FLUTTER_PUB_ADD
        } else {
            DART_PUB_ADD
        }
    }
}

#[async_trait]
impl DependencyResolver for PubResolver {
    fn name(&self) -> &'static str {
        "pub"
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
            debug!("No pubspec.yaml found; skipping dependency reconciliation");
            return ReconcileReport::Skipped;
        };
        match Self::missing_packages(manifest_text, generated_code) {
            Ok(missing) => {
                let installer = Self::installer_for(manifest_text);
                install_or_suggest(&self.options, Some(installer), manifest, missing).await
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
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const PUBSPEC: &str = r#"
name: shop_app
dependencies:
  flutter:
    sdk: flutter
  http: ^1.2.0
dev_dependencies:
  flutter_lints: ^4.0.0
dependency_overrides:
  intl: 0.19.0
flutter:
  uses-material-design: true
"#;

    #[test]
    fn declared_overrides_and_own_package_are_not_missing() {
        let code = r#"
import 'dart:async';
import 'package:flutter/material.dart';
import 'package:http/http.dart' as http;
import "package:intl/intl.dart";
import 'package:shop_app/models/cart.dart';
export 'package:provider/provider.dart';
import 'package:flutter_test/flutter_test.dart';
"#;
        assert_eq!(
            PubResolver::missing_packages(PUBSPEC, code).expect("parse"),
            vec!["provider".to_string()]
        );
    }

    #[test]
    fn non_mapping_pubspec_is_rejected() {
        assert!(matches!(
            PubResolver::declared_packages("- a\n- b\n"),
            Err(DepsError::UnexpectedShape { .. })
        ));
        assert!(PubResolver::declared_packages("").is_ok());
    }

    #[tokio::test]
    async fn flutter_and_plain_dart_pick_their_installer() {
        let runner = Arc::new(RecordingRunner::default());
        let options = ResolverOptions {
            runner: runner.clone(),
            ..ResolverOptions::default()
        };
        let resolver = PubResolver::new(options);
        let code = "import 'package:dio/dio.dart';";

        resolver
            .reconcile(Some(Path::new("/w/app/pubspec.yaml")), PUBSPEC, code)
            .await;
        resolver
            .reconcile(Some(Path::new("/w/cli/pubspec.yaml")), "name: cli\n", code)
            .await;

        let calls = runner.calls();
        assert_eq!(calls[0].0, "flutter");
        assert_eq!(calls[0].1, vec!["pub", "add", "dio"]);
        assert_eq!(calls[1].0, "dart");
    }
}
