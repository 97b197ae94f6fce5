//! # Shadow Deps
//!
//! After generated code lands in the target file, compare what it imports against what
//! the project's manifest declares and close the gap.
//!
//! ```text
//! LanguageTag ──resolver_for──> DependencyResolver
//!                                  ├─ extract_manifest_context: find + embed manifest in prompt
//!                                  └─ reconcile: used − declared ──> install | suggest | nothing
//! ```
//!
//! Every variant is best-effort. Nothing in here may fail a conversion: parse and
//! installer problems come back as a [`ReconcileReport`], not as errors.

mod cargo;
mod dart;
mod default;
mod error;
mod manifest;
mod maven;
mod npm;
mod python;
mod registry;
mod runner;

pub use cargo::CargoResolver;
pub use dart::PubResolver;
pub use default::DefaultResolver;
pub use error::{DepsError, Result};
pub use manifest::{locate_manifest, ManifestKind, MANIFEST_PLACEHOLDER};
pub use maven::MavenResolver;
pub use npm::NpmResolver;
pub use python::PythonResolver;
pub use registry::{Coordinate, MavenCentralClient, RegistryClient, MAVEN_CENTRAL_URL};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner, DEFAULT_INSTALL_TIMEOUT};

use async_trait::async_trait;
use serde::Serialize;
use shadow_protocol::LanguageTag;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result of [`DependencyResolver::extract_manifest_context`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestContext {
    pub prompt: String,
    pub location: Option<PathBuf>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// `group:artifact:version` found in a registry.
    Coordinate { coordinate: String },
    NotFound,
    LookupFailed { detail: String },
    /// No installer ran; the user has to add it (optionally with this command).
    AddManually { command: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub identifier: String,
    pub resolution: Resolution,
}

impl fmt::Display for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resolution {
            Resolution::Coordinate { coordinate } => write!(f, "{coordinate}"),
            Resolution::NotFound => write!(f, "{} (not found)", self.identifier),
            Resolution::LookupFailed { detail } => {
                write!(f, "{} (lookup error: {detail})", self.identifier)
            }
            Resolution::AddManually { command: Some(cmd) } => {
                write!(f, "{} (run `{cmd}`)", self.identifier)
            }
            Resolution::AddManually { command: None } => {
                write!(f, "{} (add it to the manifest)", self.identifier)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileReport {
    NothingMissing,
    Installed { names: Vec<String> },
    InstallFailed { names: Vec<String>, detail: String },
    Suggested { suggestions: Vec<Suggestion> },
    ManifestUnreadable { detail: String },
    Skipped,
}

impl ReconcileReport {
    /// True for outcomes worth a user-facing warning.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::InstallFailed { .. } | Self::ManifestUnreadable { .. }
        )
    }
}

/// Per-ecosystem manifest handling.
#[async_trait]
pub trait DependencyResolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Finds the manifest nearest to `target` (walking up to `root`, then searching the
    /// whole tree) and embeds its text in `prompt`. A missing manifest is not an error.
    async fn extract_manifest_context(
        &self,
        target: &Path,
        root: &Path,
        prompt: &str,
    ) -> ManifestContext;

    async fn reconcile(
        &self,
        manifest: Option<&Path>,
        manifest_text: &str,
        generated_code: &str,
    ) -> ReconcileReport;
}

/// Shared collaborators handed to every resolver variant.
#[derive(Clone)]
pub struct ResolverOptions {
    /// When false, installer variants only report the command they would run.
    pub auto_install: bool,
    pub runner: Arc<dyn CommandRunner>,
    pub registry: Arc<dyn RegistryClient>,
}

impl fmt::Debug for ResolverOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverOptions")
            .field("auto_install", &self.auto_install)
            .finish_non_exhaustive()
    }
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            auto_install: true,
            runner: Arc::new(ProcessRunner::default()),
            registry: Arc::new(MavenCentralClient::default()),
        }
    }
}

/// Pure mapping from language tag to resolver variant.
#[must_use]
pub fn resolver_for(tag: &LanguageTag, options: &ResolverOptions) -> Arc<dyn DependencyResolver> {
    match tag.as_str() {
        "rs" => Arc::new(CargoResolver::new(options.clone())),
        "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" => Arc::new(NpmResolver::new(options.clone())),
        "py" => Arc::new(PythonResolver::new(options.clone())),
        "dart" => Arc::new(PubResolver::new(options.clone())),
        "java" | "kt" => Arc::new(MavenResolver::new(options.clone())),
        _ => Arc::new(DefaultResolver),
    }
}
