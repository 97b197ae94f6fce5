use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Short language identifier derived from the target file extension.
///
/// Selects the prompt templates and the dependency resolver variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageTag(String);

impl LanguageTag {
    pub const DEFAULT: &'static str = "default";

    pub fn new(tag: impl AsRef<str>) -> Self {
        let normalized = tag.as_ref().trim().trim_start_matches('.').to_lowercase();
        if normalized.is_empty() {
            Self(Self::DEFAULT.to_string())
        } else {
            Self(normalized)
        }
    }

    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .map(|ext| Self::new(ext.to_string_lossy()))
            .unwrap_or_else(|| Self::new(""))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_comes_from_extension() {
        assert_eq!(LanguageTag::from_path(Path::new("src/App.TSX")).as_str(), "tsx");
        assert_eq!(LanguageTag::from_path(Path::new("lib/main.dart")).as_str(), "dart");
    }

    #[test]
    fn missing_extension_falls_back_to_default() {
        let tag = LanguageTag::from_path(Path::new("Makefile"));
        assert!(tag.is_default());
        assert_eq!(LanguageTag::new(" .RS ").as_str(), "rs");
    }
}
