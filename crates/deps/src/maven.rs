use crate::manifest::ManifestKind;
use crate::{
    DependencyResolver, ManifestContext, ReconcileReport, Resolution, ResolverOptions, Suggestion,
};
use async_trait::async_trait;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;

/// Import roots provided by the JDK / Kotlin stdlib.
pub const JVM_BUILTIN_PREFIXES: &[&str] = &["java.", "javax.", "kotlin."];

const KIND: ManifestKind = ManifestKind {
    file_names: &["pom.xml", "build.gradle", "build.gradle.kts"],
    placeholder: "config",
    absent_text: "No build file found",
};

static DEPENDENCY_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<dependency>(.*?)</dependency>").expect("dependency regex"));
static GROUP_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<groupId>\s*([^<\s]+)\s*</groupId>").expect("groupId regex"));
static ARTIFACT_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<artifactId>\s*([^<\s]+)\s*</artifactId>").expect("artifactId regex")
});
static POM_NESTED_SECTIONS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)<parent>.*?</parent>|<dependencies>.*?</dependencies>|<dependencyManagement>.*?</dependencyManagement>|<build>.*?</build>|<plugins>.*?</plugins>",
    )
    .expect("pom section regex")
});
static GRADLE_DEPENDENCY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\b(?:implementation|api|compile|compileOnly|runtimeOnly|testImplementation|testCompile|testRuntimeOnly|kapt|ksp|annotationProcessor)\s*\(?\s*['"]([^'":\s]+):([^'":\s]+)"#,
    )
    .expect("gradle dependency regex")
});
static GRADLE_GROUP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^\s*group\s*=\s*['"]([^'"]+)['"]"#).expect("gradle group regex")
});
static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*import\s+(static\s+)?([A-Za-z_][\w.]*?)(\.\*)?\s*;?\s*$").expect("import regex")
});

/// A `groupId:artifactId` pair declared by the build file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeclaredArtifact {
    pub group: String,
    pub artifact: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildFile {
    pub own_group: Option<String>,
    pub artifacts: BTreeSet<DeclaredArtifact>,
}

impl BuildFile {
    /// Best-effort scan of `pom.xml` or Gradle DSL text.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut artifacts = BTreeSet::new();
        for block in DEPENDENCY_BLOCK_RE.captures_iter(text) {
            let body = &block[1];
            if let (Some(group), Some(artifact)) =
                (GROUP_ID_RE.captures(body), ARTIFACT_ID_RE.captures(body))
            {
                artifacts.insert(DeclaredArtifact {
                    group: group[1].to_string(),
                    artifact: artifact[1].to_string(),
                });
            }
        }
        for cap in GRADLE_DEPENDENCY_RE.captures_iter(text) {
            artifacts.insert(DeclaredArtifact {
                group: cap[1].to_string(),
                artifact: cap[2].to_string(),
            });
        }

        let pom_top_level = POM_NESTED_SECTIONS_RE.replace_all(text, "");
        let own_group = GROUP_ID_RE
            .captures(&pom_top_level)
            .or_else(|| GRADLE_GROUP_RE.captures(text))
            .map(|cap| cap[1].to_string());

        Self {
            own_group,
            artifacts,
        }
    }

    /// `groupId.artifactId` for every declared pair.
    #[must_use]
    pub fn declared_ids(&self) -> BTreeSet<String> {
        self.artifacts
            .iter()
            .map(|a| format!("{}.{}", a.group, a.artifact))
            .collect()
    }

    /// True when an import plausibly comes from something already declared.
    #[must_use]
    pub fn covers(&self, import: &str) -> bool {
        if let Some(own) = &self.own_group {
            if import == own || import.starts_with(&format!("{own}.")) {
                return true;
            }
        }
        let segments: Vec<&str> = import.split('.').collect();
        self.artifacts.iter().any(|a| {
            if import.starts_with(&format!("{}.", a.group)) {
                return true;
            }
            // Packages often drop a middle group segment (`com.google.code.gson` ships
            // `com.google.gson`); the artifact name only counts under the same organisation.
            let organisation: Vec<&str> = a.group.split('.').take(2).collect();
            organisation.len() == 2
                && segments.starts_with(&organisation)
                && segments[2..].contains(&a.artifact.as_str())
        })
    }
}

/// Imported classes that are neither JVM built-ins nor covered by the build file.
#[must_use]
pub fn missing_imports(build: &BuildFile, code: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    for cap in IMPORT_RE.captures_iter(code) {
        let mut name = cap[2].to_string();
        // `import static a.b.C.member` names a member of class a.b.C.
        if cap.get(1).is_some() && cap.get(3).is_none() {
            if let Some((class, _member)) = name.rsplit_once('.') {
                name = class.to_string();
            }
        }
        if JVM_BUILTIN_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
        {
            continue;
        }
        if build.covers(&name) {
            continue;
        }
        seen.insert(name);
    }
    seen.into_iter().collect()
}

/// Build-file lookup: missing imports are resolved against a registry and suggested,
/// never installed.
#[derive(Debug, Clone)]
pub struct MavenResolver {
    options: ResolverOptions,
}

impl MavenResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self { options }
    }

    async fn resolve(&self, import: String) -> Suggestion {
        let resolution = match self.options.registry.lookup(&import).await {
            Ok(Some(coordinate)) => Resolution::Coordinate {
                coordinate: coordinate.to_string(),
            },
            Ok(None) => Resolution::NotFound,
            Err(err) => {
                warn!("Maven Central lookup failed for {import}: {err}");
                Resolution::LookupFailed {
                    detail: err.to_string(),
                }
            }
        };
        Suggestion {
            identifier: import,
            resolution,
        }
    }
}

#[async_trait]
impl DependencyResolver for MavenResolver {
    fn name(&self) -> &'static str {
        "maven"
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
            debug!("No build file found; skipping dependency lookup");
            return ReconcileReport::Skipped;
        };
        if manifest_text.trim().is_empty() {
            return ReconcileReport::Skipped;
        }

        let build = BuildFile::parse(manifest_text);
        let missing = missing_imports(&build, generated_code);
        if missing.is_empty() {
            return ReconcileReport::NothingMissing;
        }

        let mut suggestions = Vec::with_capacity(missing.len());
        for import in missing {
            suggestions.push(self.resolve(import).await);
        }
        let tool = manifest
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "build file".to_string());
        info!(
            "Dependencies to add to {tool}:\n{}",
            suggestions
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")
        );
        ReconcileReport::Suggested { suggestions }
    }
}
