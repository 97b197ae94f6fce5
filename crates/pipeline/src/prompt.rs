use crate::error::{PipelineError, Result};
use shadow_protocol::LanguageTag;
use std::path::{Path, PathBuf};

pub const SYSTEM_PROMPT_FILE: &str = "system_prompt.md";
pub const USER_PROMPT_FILE: &str = "user_prompt.md";

/// Directory name consulted when a language has no templates of its own.
pub const DEFAULT_TEMPLATE_DIR: &str = "default";

const BUILTIN_SYSTEM: &str = include_str!("../prompts/default/system_prompt.md");
const BUILTIN_USER: &str = include_str!("../prompts/default/user_prompt.md");
const BUILTIN_USER_RS: &str = include_str!("../prompts/rs/user_prompt.md");
const BUILTIN_USER_TS: &str = include_str!("../prompts/ts/user_prompt.md");
const BUILTIN_USER_PY: &str = include_str!("../prompts/py/user_prompt.md");
const BUILTIN_USER_DART: &str = include_str!("../prompts/dart/user_prompt.md");
const BUILTIN_USER_JAVA: &str = include_str!("../prompts/java/user_prompt.md");

/// Placeholders every user template understands.
pub const PSEUDOCODE_PLACEHOLDER: &str = "pseudocode";
pub const CONTEXT_PLACEHOLDER: &str = "context";
pub const EXISTING_CODE_PLACEHOLDER: &str = "existing_code";
pub const LANGUAGE_PLACEHOLDER: &str = "language";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    pub system: String,
    pub user: String,
}

impl PromptTemplates {
    /// Templates compiled into the binary for `tag`.
    #[must_use]
    pub fn builtin(tag: &LanguageTag) -> Self {
        let user = match tag.as_str() {
            "rs" => BUILTIN_USER_RS,
            "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" => BUILTIN_USER_TS,
            "py" => BUILTIN_USER_PY,
            "dart" => BUILTIN_USER_DART,
            "java" | "kt" => BUILTIN_USER_JAVA,
            _ => BUILTIN_USER,
        };
        Self {
            system: BUILTIN_SYSTEM.to_string(),
            user: user.to_string(),
        }
    }

    /// A user template that never mentions the pseudocode would send nothing useful.
    pub fn validate(&self, name: &str) -> Result<()> {
        let marker = format!("{{{{{PSEUDOCODE_PLACEHOLDER}}}}}");
        if !self.user.contains(&marker) {
            return Err(PipelineError::TemplateError {
                name: name.to_string(),
                reason: format!("user template has no {marker} placeholder"),
            });
        }
        Ok(())
    }
}

/// Resolves `<dir>/<tag>/{system,user}_prompt.md`, then `<dir>/default/`, then built-ins.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    dir: Option<PathBuf>,
}

impl PromptLibrary {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub async fn load(&self, tag: &LanguageTag) -> Result<PromptTemplates> {
        let builtin = PromptTemplates::builtin(tag);
        let Some(dir) = &self.dir else {
            return Ok(builtin);
        };

        let system = load_first(dir, tag, SYSTEM_PROMPT_FILE).await?;
        let user = load_first(dir, tag, USER_PROMPT_FILE).await?;
        let user_from_disk = user.is_some();
        let templates = PromptTemplates {
            system: system.unwrap_or(builtin.system),
            user: user.unwrap_or(builtin.user),
        };
        if user_from_disk {
            templates.validate(&dir.join(tag.as_str()).display().to_string())?;
        }
        Ok(templates)
    }
}

async fn load_first(dir: &Path, tag: &LanguageTag, file: &str) -> Result<Option<String>> {
    for candidate in [
        dir.join(tag.as_str()).join(file),
        dir.join(DEFAULT_TEMPLATE_DIR).join(file),
    ] {
        match tokio::fs::read_to_string(&candidate).await {
            Ok(text) => return Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(None)
}

/// Replaces `{{name}}` placeholders in one pass.
///
/// Substituted values are never rescanned, so pseudocode that happens to contain
/// `{{...}}` is sent verbatim. Placeholders the resolver does not know are kept
/// as written so a later pass can fill them.
#[must_use]
pub fn render_placeholders<'a>(
    template: &str,
    mut resolve: impl FnMut(&str) -> Option<&'a str>,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = after_open[..close].trim();
        match is_placeholder_name(name).then(|| resolve(name)).flatten() {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after_open[close + 2..];
    }
    out.push_str(rest);
    out
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Values substituted into the language templates for one conversion.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub language: &'a LanguageTag,
    pub diff: &'a str,
    pub context: &'a str,
    pub existing_code: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    pub system: String,
    pub user: String,
}

/// Pure templating; knows nothing about how prompts are sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptAssembler;

impl PromptAssembler {
    #[must_use]
    pub fn assemble(&self, templates: &PromptTemplates, inputs: PromptInputs<'_>) -> Prompts {
        let resolve = |name: &str| match name {
            PSEUDOCODE_PLACEHOLDER => Some(inputs.diff),
            CONTEXT_PLACEHOLDER => Some(inputs.context),
            EXISTING_CODE_PLACEHOLDER => Some(inputs.existing_code),
            LANGUAGE_PLACEHOLDER => Some(inputs.language.as_str()),
            _ => None,
        };
        Prompts {
            system: render_placeholders(&templates.system, resolve),
            user: render_placeholders(&templates.user, resolve),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn unknown_placeholders_survive() {
        let rendered = render_placeholders("a {{x}} b {{ y }} {{cargo_toml}} {{", |name| {
            (name == "x" || name == "y").then_some("X")
        });
        assert_eq!(rendered, "a X b X {{cargo_toml}} {{");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let tag = LanguageTag::new("ts");
        let templates = PromptTemplates {
            system: "lang={{language}}".to_string(),
            user: "{{pseudocode}}|{{context}}|{{existing_code}}|{{language}}".to_string(),
        };
        let prompts = PromptAssembler.assemble(
            &templates,
            PromptInputs {
                language: &tag,
                diff: "+ print {{context}}",
                context: "ctx",
                existing_code: "",
            },
        );
        assert_eq!(prompts.system, "lang=ts");
        assert_eq!(prompts.user, "+ print {{context}}|ctx||ts");
    }

    #[test]
    fn builtins_carry_manifest_placeholders() {
        assert!(PromptTemplates::builtin(&LanguageTag::new("rs"))
            .user
            .contains("{{cargo_toml}}"));
        assert!(PromptTemplates::builtin(&LanguageTag::new("tsx"))
            .user
            .contains("{{package_json}}"));
        let fallback = PromptTemplates::builtin(&LanguageTag::new("zig"));
        fallback.validate("builtin").expect("builtin default is valid");
    }

    #[tokio::test]
    async fn directory_templates_override_builtins() {
        let temp = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(temp.path().join("rs")).expect("mkdir");
        std::fs::create_dir_all(temp.path().join("default")).expect("mkdir");
        std::fs::write(temp.path().join("rs/user_prompt.md"), "rust {{pseudocode}}").expect("write");
        std::fs::write(temp.path().join("default/system_prompt.md"), "shared").expect("write");

        let library = PromptLibrary::new(Some(temp.path().to_path_buf()));
        let rs = library.load(&LanguageTag::new("rs")).await.expect("load");
        assert_eq!(rs.user, "rust {{pseudocode}}");
        assert_eq!(rs.system, "shared");

        let py = library.load(&LanguageTag::new("py")).await.expect("load");
        assert_eq!(py.user, PromptTemplates::builtin(&LanguageTag::new("py")).user);
    }

    #[tokio::test]
    async fn template_without_pseudocode_is_rejected() {
        let temp = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(temp.path().join("py")).expect("mkdir");
        std::fs::write(temp.path().join("py/user_prompt.md"), "nothing here").expect("write");

        let library = PromptLibrary::new(Some(temp.path().to_path_buf()));
        let err = library.load(&LanguageTag::new("py")).await.unwrap_err();
        assert!(matches!(err, PipelineError::TemplateError { .. }));
    }
}
