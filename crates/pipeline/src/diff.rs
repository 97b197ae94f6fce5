use crate::error::{PipelineError, Result};
use shadow_protocol::DirectiveScanner;
use similar::{ChangeTag, TextDiff};

pub const ADDED_PREFIX: &str = "+ ";
pub const REMOVED_PREFIX: &str = "- ";
pub const UNCHANGED_PREFIX: &str = "  ";

/// Line-level delta between two pseudocode revisions.
///
/// Both sides have directive-only lines removed and trailing whitespace trimmed
/// before comparison. Output lines carry exactly one of `+ `, `- ` or two spaces.
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    scanner: DirectiveScanner,
}

impl DiffEngine {
    pub fn new(scanner: DirectiveScanner) -> Self {
        Self { scanner }
    }

    pub fn with_directive_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        Ok(Self::new(DirectiveScanner::new(names)?))
    }

    #[must_use]
    pub fn scanner(&self) -> &DirectiveScanner {
        &self.scanner
    }

    /// The text the diff actually compares: directives stripped, CRLF folded, trailing
    /// whitespace trimmed.
    #[must_use]
    pub fn normalize(&self, text: &str) -> String {
        let folded = text.replace("\r\n", "\n");
        self.scanner
            .strip_directive_lines(&folded)
            .trim_end()
            .to_string()
    }

    /// `previous == None` (or empty after normalisation) means first run: every line is added.
    #[must_use]
    pub fn diff(&self, previous: Option<&str>, current: &str) -> String {
        let current = self.normalize(current);
        let previous = previous.map(|text| self.normalize(text)).unwrap_or_default();

        if previous.is_empty() {
            return prefixed(&current, ADDED_PREFIX);
        }
        // Nothing left to compare against; the synthetic terminator would show up as an
        // inserted empty line.
        if current.is_empty() {
            return prefixed(&previous, REMOVED_PREFIX);
        }

        // A terminating newline on both sides keeps the last line comparable.
        let old = with_terminator(&previous);
        let new = with_terminator(&current);
        let diff = TextDiff::from_lines(old.as_str(), new.as_str());

        let mut lines = Vec::new();
        for change in diff.iter_all_changes() {
            let prefix = match change.tag() {
                ChangeTag::Insert => ADDED_PREFIX,
                ChangeTag::Delete => REMOVED_PREFIX,
                ChangeTag::Equal => UNCHANGED_PREFIX,
            };
            let line = change.value().trim_end_matches('\n');
            lines.push(format!("{prefix}{line}"));
        }
        lines.join("\n").trim_end().to_string()
    }

    /// Rebuilds the current text from the previous one and a rendered diff.
    ///
    /// Unchanged and removed lines must match `previous` in order; anything else is a
    /// [`PipelineError::DiffMismatch`].
    pub fn apply(&self, previous: Option<&str>, diff: &str) -> Result<String> {
        let previous = previous.map(|text| self.normalize(text)).unwrap_or_default();
        let mut remaining = split_lines(&previous);
        let mut out = Vec::new();

        for (idx, line) in split_lines(diff).enumerate() {
            let (tag, body) = parse_diff_line(line).ok_or_else(|| {
                PipelineError::DiffMismatch(format!("line {}: unknown prefix in {line:?}", idx + 1))
            })?;
            match tag {
                ChangeTag::Insert => out.push(body),
                ChangeTag::Equal | ChangeTag::Delete => {
                    let expected = remaining.next().ok_or_else(|| {
                        PipelineError::DiffMismatch(format!(
                            "line {}: previous text is shorter than the diff",
                            idx + 1
                        ))
                    })?;
                    if expected != body {
                        return Err(PipelineError::DiffMismatch(format!(
                            "line {}: expected {expected:?}, diff has {body:?}",
                            idx + 1
                        )));
                    }
                    if tag == ChangeTag::Equal {
                        out.push(body);
                    }
                }
            }
        }

        if remaining.next().is_some() {
            return Err(PipelineError::DiffMismatch(
                "diff does not cover the whole previous text".to_string(),
            ));
        }
        Ok(out.join("\n"))
    }
}

fn prefixed(text: &str, prefix: &str) -> String {
    split_lines(text)
        .map(|line| format!("{prefix}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}

fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    let empty = text.is_empty();
    text.split('\n').filter(move |_| !empty)
}

fn with_terminator(text: &str) -> String {
    let mut owned = String::with_capacity(text.len() + 1);
    owned.push_str(text);
    owned.push('\n');
    owned
}

fn parse_diff_line(line: &str) -> Option<(ChangeTag, &str)> {
    if let Some(body) = line.strip_prefix(ADDED_PREFIX) {
        return Some((ChangeTag::Insert, body));
    }
    if let Some(body) = line.strip_prefix(REMOVED_PREFIX) {
        return Some((ChangeTag::Delete, body));
    }
    if let Some(body) = line.strip_prefix(UNCHANGED_PREFIX) {
        return Some((ChangeTag::Equal, body));
    }
    // Trailing-space trimming can leave a bare marker for an empty line.
    match line {
        "+" => Some((ChangeTag::Insert, "")),
        "-" => Some((ChangeTag::Delete, "")),
        "" | " " => Some((ChangeTag::Equal, "")),
        _ => None,
    }
}
