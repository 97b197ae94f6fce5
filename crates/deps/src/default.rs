use crate::{DependencyResolver, ManifestContext, ReconcileReport};
use async_trait::async_trait;
use std::path::Path;

/// Used for any language without a manifest format; never touches the prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResolver;

#[async_trait]
impl DependencyResolver for DefaultResolver {
    fn name(&self) -> &'static str {
        "default"
    }

    async fn extract_manifest_context(
        &self,
        _target: &Path,
        _root: &Path,
        prompt: &str,
    ) -> ManifestContext {
        ManifestContext {
            prompt: prompt.to_string(),
            location: None,
            text: String::new(),
        }
    }

    async fn reconcile(
        &self,
        _manifest: Option<&Path>,
        _manifest_text: &str,
        _generated_code: &str,
    ) -> ReconcileReport {
        ReconcileReport::Skipped
    }
}
