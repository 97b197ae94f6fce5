use crate::LanguageTag;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Suffix appended to a target file name to form its shadow file name.
pub const SHADOW_SUFFIX: &str = ".shadow";

/// Mirror directory (relative to the project root) that holds shadow files.
pub const DEFAULT_SHADOW_DIR: &str = ".shadows";

/// Prefix used when a checkpoint is persisted in a shared key/value namespace.
pub const CHECKPOINT_KEY_PREFIX: &str = "shadow_checkpoint_";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShadowPathError {
    #[error("{} is already a shadow file", .0.display())]
    AlreadyShadow(PathBuf),

    #[error("{} is not a shadow file", .0.display())]
    NotShadow(PathBuf),

    #[error("{} is outside the project root {}", .path.display(), .root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },
}

/// Maps target files to shadow files and back.
///
/// Two conventions are recognised when going from shadow to target:
/// - mirror: `<root>/<mirror_dir>/<relative>.shadow` ⇒ `<root>/<relative>`
/// - suffix: `<anything>.shadow` outside the mirror ⇒ `<anything>`
///
/// New shadow files are always laid out with the mirror convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowLayout {
    root: PathBuf,
    mirror_dir: String,
}

impl ShadowLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mirror_dir: DEFAULT_SHADOW_DIR.to_string(),
        }
    }

    #[must_use]
    pub fn with_mirror_dir(mut self, mirror_dir: impl Into<String>) -> Self {
        let mirror_dir = mirror_dir.into();
        let trimmed = mirror_dir.trim().trim_matches('/');
        if !trimmed.is_empty() {
            self.mirror_dir = trimmed.to_string();
        }
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn mirror_root(&self) -> PathBuf {
        self.root.join(&self.mirror_dir)
    }

    #[must_use]
    pub fn is_shadow(path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().ends_with(SHADOW_SUFFIX))
            .unwrap_or(false)
    }

    pub fn shadow_for(&self, target: &Path) -> Result<PathBuf, ShadowPathError> {
        if Self::is_shadow(target) {
            return Err(ShadowPathError::AlreadyShadow(target.to_path_buf()));
        }
        let relative = self.relative_to_root(target)?;
        let mut shadow: OsString = self.mirror_root().join(relative).into_os_string();
        shadow.push(SHADOW_SUFFIX);
        Ok(PathBuf::from(shadow))
    }

    pub fn target_for(&self, shadow: &Path) -> Result<PathBuf, ShadowPathError> {
        if !Self::is_shadow(shadow) {
            return Err(ShadowPathError::NotShadow(shadow.to_path_buf()));
        }
        let absolute = self.absolutize(shadow);
        let stripped = strip_shadow_suffix(&absolute)
            .ok_or_else(|| ShadowPathError::NotShadow(shadow.to_path_buf()))?;

        match stripped.strip_prefix(self.mirror_root()) {
            Ok(relative) => Ok(self.root.join(relative)),
            Err(_) => Ok(stripped),
        }
    }

    pub fn pair(&self, shadow: &Path) -> Result<ShadowPair, ShadowPathError> {
        let target = self.target_for(shadow)?;
        Ok(ShadowPair {
            shadow: self.absolutize(shadow),
            language: LanguageTag::from_path(&target),
            target,
        })
    }

    pub fn pair_for_target(&self, target: &Path) -> Result<ShadowPair, ShadowPathError> {
        let shadow = self.shadow_for(target)?;
        Ok(ShadowPair {
            shadow,
            language: LanguageTag::from_path(target),
            target: self.absolutize(target),
        })
    }

    fn absolutize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn relative_to_root(&self, path: &Path) -> Result<PathBuf, ShadowPathError> {
        let absolute = self.absolutize(path);
        let outside = || ShadowPathError::OutsideRoot {
            path: path.to_path_buf(),
            root: self.root.clone(),
        };
        let relative = absolute.strip_prefix(&self.root).map_err(|_| outside())?;

        let mut normalized = PathBuf::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(outside())
                }
            }
        }
        if normalized.as_os_str().is_empty() {
            return Err(outside());
        }
        Ok(normalized)
    }
}

fn strip_shadow_suffix(path: &Path) -> Option<PathBuf> {
    let raw = path.to_string_lossy();
    let stripped = raw.strip_suffix(SHADOW_SUFFIX)?;
    if stripped.is_empty() || stripped.ends_with('/') || stripped.ends_with('\\') {
        return None;
    }
    Some(PathBuf::from(stripped))
}

/// A shadow file together with the target it compiles into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowPair {
    pub shadow: PathBuf,
    pub target: PathBuf,
    pub language: LanguageTag,
}

impl ShadowPair {
    /// Stable identity of the shadow buffer, used as the checkpoint and registry key.
    #[must_use]
    pub fn shadow_id(&self) -> String {
        self.shadow.to_string_lossy().into_owned()
    }

    #[must_use]
    pub fn target_id(&self) -> String {
        self.target.to_string_lossy().into_owned()
    }
}

#[must_use]
pub fn checkpoint_key(shadow_id: &str) -> String {
    format!("{CHECKPOINT_KEY_PREFIX}{shadow_id}")
}

#[must_use]
pub fn id_from_checkpoint_key(key: &str) -> Option<&str> {
    key.strip_prefix(CHECKPOINT_KEY_PREFIX)
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn layout() -> ShadowLayout {
        ShadowLayout::new("/work/project")
    }

    #[test]
    fn mirror_mapping_round_trips() {
        let layout = layout();
        let target = Path::new("/work/project/src/foo.ts");
        let shadow = layout.shadow_for(target).expect("shadow path");
        assert_eq!(
            shadow,
            PathBuf::from("/work/project/.shadows/src/foo.ts.shadow")
        );
        assert_eq!(layout.target_for(&shadow).expect("target"), target);
    }

    #[test]
    fn relative_targets_resolve_against_root() {
        let layout = layout();
        let shadow = layout.shadow_for(Path::new("./lib/a.rs")).expect("shadow");
        assert_eq!(
            shadow,
            PathBuf::from("/work/project/.shadows/lib/a.rs.shadow")
        );
    }

    #[test]
    fn suffix_convention_outside_mirror() {
        let layout = layout();
        let target = layout
            .target_for(Path::new("/work/project/src/main.py.shadow"))
            .expect("target");
        assert_eq!(target, PathBuf::from("/work/project/src/main.py"));
    }

    #[test]
    fn custom_mirror_dir_is_respected() {
        let layout = layout().with_mirror_dir("/.shadow/");
        let shadow = layout
            .shadow_for(Path::new("/work/project/a.dart"))
            .expect("shadow");
        assert_eq!(shadow, PathBuf::from("/work/project/.shadow/a.dart.shadow"));
    }

    #[test]
    fn refuses_shadow_of_shadow() {
        let err = layout()
            .shadow_for(Path::new("/work/project/.shadows/a.ts.shadow"))
            .unwrap_err();
        assert!(matches!(err, ShadowPathError::AlreadyShadow(_)));
    }

    #[test]
    fn refuses_targets_outside_root() {
        let layout = layout();
        assert!(matches!(
            layout.shadow_for(Path::new("/elsewhere/a.ts")),
            Err(ShadowPathError::OutsideRoot { .. })
        ));
        assert!(matches!(
            layout.shadow_for(Path::new("../a.ts")),
            Err(ShadowPathError::OutsideRoot { .. })
        ));
    }

    #[test]
    fn non_shadow_has_no_target() {
        assert!(matches!(
            layout().target_for(Path::new("/work/project/src/a.ts")),
            Err(ShadowPathError::NotShadow(_))
        ));
    }

    #[test]
    fn pair_carries_language_from_target() {
        let pair = layout()
            .pair(Path::new(".shadows/src/lib.rs.shadow"))
            .expect("pair");
        assert_eq!(pair.language.as_str(), "rs");
        assert_eq!(pair.target, PathBuf::from("/work/project/src/lib.rs"));
        assert_eq!(
            pair.shadow_id(),
            "/work/project/.shadows/src/lib.rs.shadow".to_string()
        );
    }

    #[test]
    fn checkpoint_keys_are_reversible() {
        let key = checkpoint_key("/a/b.ts.shadow");
        assert_eq!(key, "shadow_checkpoint_/a/b.ts.shadow");
        assert_eq!(id_from_checkpoint_key(&key), Some("/a/b.ts.shadow"));
        assert_eq!(id_from_checkpoint_key("other_key"), None);
        assert_eq!(id_from_checkpoint_key(CHECKPOINT_KEY_PREFIX), None);
    }
}
