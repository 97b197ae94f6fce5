use log::warn;
use shadow_protocol::DirectiveScanner;
use std::path::{Component, Path, PathBuf};

/// One directive target that could be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFile {
    pub path: String,
    pub content: String,
}

/// Files referenced by the pseudocode's directives, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextBundle {
    pub files: Vec<ContextFile>,
    pub skipped: Vec<String>,
}

impl ContextBundle {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Each file as a fenced block labelled by its path.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for file in &self.files {
            out.push_str("**");
            out.push_str(&file.path);
            out.push_str(":**\n```\n");
            out.push_str(file.content.trim_end_matches('\n'));
            out.push_str("\n```\n\n");
        }
        out.trim().to_string()
    }
}

/// Loads the files named by `use("...")`-style directives, relative to the project root.
#[derive(Debug, Clone)]
pub struct DirectiveContextExtractor {
    root: PathBuf,
    scanner: DirectiveScanner,
}

impl DirectiveContextExtractor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scanner: DirectiveScanner::default(),
        }
    }

    #[must_use]
    pub fn with_scanner(mut self, scanner: DirectiveScanner) -> Self {
        self.scanner = scanner;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scans the whole pseudocode, not a diff of it. Unreadable paths are logged and skipped.
    pub async fn extract(&self, pseudocode: &str) -> ContextBundle {
        let mut bundle = ContextBundle::default();
        for path in self.scanner.paths(pseudocode) {
            let Some(resolved) = self.resolve(&path) else {
                warn!("Skipping context file {path}: outside the project root");
                bundle.skipped.push(path);
                continue;
            };
            match tokio::fs::read_to_string(&resolved).await {
                Ok(content) => bundle.files.push(ContextFile { path, content }),
                Err(err) => {
                    warn!(
                        "Skipping context file {path} ({}): {err}",
                        resolved.display()
                    );
                    bundle.skipped.push(path);
                }
            }
        }
        bundle
    }

    pub async fn render(&self, pseudocode: &str) -> String {
        self.extract(pseudocode).await.render()
    }

    /// `root`-relative path with `.` and `..` folded; `None` if it would leave the root.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let mut relative = PathBuf::new();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => relative.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !relative.pop() {
                        return None;
                    }
                }
                Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        Some(self.root.join(relative))
    }
}
