use crate::ManifestContext;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use log::{debug, warn};
use once_cell::sync::Lazy;
use shadow_pipeline::render_placeholders;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Substituted by every variant in addition to its own placeholder.
pub const MANIFEST_PLACEHOLDER: &str = "manifest";

const EXCLUDED_DIRS: &[&str] = &[
    "**/target",
    "**/node_modules",
    "**/.git",
    "**/vendor",
    "**/.shadows",
    "**/.dart_tool",
    "**/.venv",
];

static EXCLUDED: Lazy<GlobSet> = Lazy::new(|| {
    let mut builder = GlobSetBuilder::new();
    for pattern in EXCLUDED_DIRS {
        builder.add(Glob::new(pattern).expect("excluded dir glob"));
    }
    builder.build().expect("excluded dir globset")
});

/// What a variant looks for and how it embeds it.
#[derive(Debug, Clone, Copy)]
pub struct ManifestKind {
    /// Candidate file names, most preferred first.
    pub file_names: &'static [&'static str],
    pub placeholder: &'static str,
    /// Text substituted when no manifest is found.
    pub absent_text: &'static str,
}

impl ManifestKind {
    pub(crate) async fn context(
        &self,
        target: &Path,
        root: &Path,
        prompt: &str,
    ) -> ManifestContext {
        let (location, text) = match locate_manifest(self.file_names, target, root).await {
            Some(path) => match tokio::fs::read_to_string(&path).await {
                Ok(text) => (Some(path), text),
                Err(err) => {
                    warn!("Failed to read manifest {}: {err}", path.display());
                    (None, String::new())
                }
            },
            None => (None, String::new()),
        };

        let fill = if location.is_some() {
            text.as_str()
        } else {
            self.absent_text
        };
        let prompt = render_placeholders(prompt, |name| {
            (name == self.placeholder || name == MANIFEST_PLACEHOLDER).then_some(fill)
        });
        ManifestContext {
            prompt,
            location,
            text,
        }
    }
}

/// Nearest manifest: walk up from the target's directory to `root`, then fall back
/// to the shallowest match anywhere under `root`.
pub async fn locate_manifest(
    file_names: &'static [&'static str],
    target: &Path,
    root: &Path,
) -> Option<PathBuf> {
    if let Some(found) = walk_up(file_names, target, root).await {
        return Some(found);
    }
    let root = root.to_path_buf();
    match tokio::task::spawn_blocking(move || search_workspace(file_names, &root)).await {
        Ok(found) => found,
        Err(err) => {
            warn!("Manifest search task failed: {err}");
            None
        }
    }
}

async fn walk_up(file_names: &[&str], target: &Path, root: &Path) -> Option<PathBuf> {
    let mut dir = target.parent()?;
    loop {
        for name in file_names {
            let candidate = dir.join(name);
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Some(candidate);
            }
        }
        if dir == root {
            return None;
        }
        match dir.parent() {
            Some(parent) if parent.starts_with(root) => dir = parent,
            _ => return None,
        }
    }
}

fn search_workspace(file_names: &[&str], root: &Path) -> Option<PathBuf> {
    let wanted: BTreeSet<&str> = file_names.iter().copied().collect();
    let walk_root = root.to_path_buf();
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true);
    builder.filter_entry(move |entry| {
        let relative = entry.path().strip_prefix(&walk_root).unwrap_or(entry.path());
        !EXCLUDED.is_match(relative)
    });

    // (depth, preference, path) so the shallowest, most preferred file wins.
    let mut best: Option<(usize, usize, PathBuf)> = None;
    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                debug!("Skipping entry during manifest search: {err}");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !wanted.contains(name) {
            continue;
        }
        let preference = file_names.iter().position(|n| *n == name).unwrap_or(usize::MAX);
        let candidate = (entry.depth(), preference, entry.into_path());
        if best.as_ref().map_or(true, |current| candidate < *current) {
            best = Some(candidate);
        }
    }
    best.map(|(_, _, path)| path)
}
