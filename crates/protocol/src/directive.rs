use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Directive names recognised in pseudocode; all of them behave identically.
pub const DEFAULT_DIRECTIVE_NAMES: &[&str] = &["use", "import", "context"];

static QUOTED_ARG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"\n]+)""#).expect("quoted argument regex"));

static DEFAULT_SCANNER: Lazy<DirectiveScanner> = Lazy::new(|| {
    DirectiveScanner::new(DEFAULT_DIRECTIVE_NAMES).expect("default directive names are valid")
});

/// Finds `name("path", ...)` directive calls embedded in pseudocode.
#[derive(Debug, Clone)]
pub struct DirectiveScanner {
    call: Regex,
    whole_line: Regex,
    line_block: Regex,
}

impl DirectiveScanner {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Result<Self, regex::Error> {
        let alternation = names
            .iter()
            .map(|name| regex::escape(name.as_ref().trim()))
            .filter(|name| !name.is_empty())
            .collect::<Vec<_>>()
            .join("|");
        let alternation = if alternation.is_empty() {
            // Matches nothing: an empty name list disables directives.
            r"\b\B".to_string()
        } else {
            alternation
        };

        let args = r#"\s*"[^"\n]*"(?:\s*,\s*"[^"\n]*")*\s*,?\s*"#;
        Ok(Self {
            call: Regex::new(&format!(r"\b(?:{alternation})\s*\(([^)]*)\)"))?,
            whole_line: Regex::new(&format!(
                r"^[ \t]*(?:{alternation})[ \t]*\({args}\)[ \t]*;?[ \t]*$"
            ))?,
            line_block: Regex::new(&format!(
                r"(?m)^[ \t]*(?:{alternation})[ \t]*\({args}\)[ \t]*;?[ \t]*(?:\r?\n|$)"
            ))?,
        })
    }

    /// Every quoted path across all directive calls, deduplicated in first-seen order.
    #[must_use]
    pub fn paths(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for call in self.call.captures_iter(text) {
            let Some(args) = call.get(1) else {
                continue;
            };
            for arg in QUOTED_ARG.captures_iter(args.as_str()) {
                let path = arg[1].trim();
                if path.is_empty() {
                    continue;
                }
                if seen.insert(path.to_string()) {
                    out.push(path.to_string());
                }
            }
        }
        out
    }

    /// True when the line is nothing but a directive call.
    #[must_use]
    pub fn is_directive_line(&self, line: &str) -> bool {
        self.whole_line.is_match(line.trim_end_matches('\r'))
    }

    /// Removes directive-only lines (including calls whose arguments span lines).
    #[must_use]
    pub fn strip_directive_lines(&self, text: &str) -> String {
        self.line_block.replace_all(text, "").into_owned()
    }
}

impl Default for DirectiveScanner {
    fn default() -> Self {
        DEFAULT_SCANNER.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn collects_paths_from_every_directive_name() {
        let scanner = DirectiveScanner::default();
        let text = "use(\"a.ts\")\nfoo()\ncall context(\"b.ts\", \"c.ts\") inline\nimport(\"d.ts\")";
        assert_eq!(scanner.paths(text), vec!["a.ts", "b.ts", "c.ts", "d.ts"]);
    }

    #[test]
    fn duplicate_paths_are_reported_once() {
        let scanner = DirectiveScanner::default();
        let text = "use(\"a.ts\")\ncontext(\"a.ts\", \"b.ts\")\nuse(\"b.ts\")";
        assert_eq!(scanner.paths(text), vec!["a.ts", "b.ts"]);
    }

    #[test]
    fn arguments_may_span_lines() {
        let scanner = DirectiveScanner::default();
        let text = "context(\n  \"a.rs\",\n  \"b.rs\"\n)\nfn main";
        assert_eq!(scanner.paths(text), vec!["a.rs", "b.rs"]);
        assert_eq!(scanner.strip_directive_lines(text), "fn main");
    }

    #[test]
    fn only_whole_lines_are_directive_lines() {
        let scanner = DirectiveScanner::default();
        assert!(scanner.is_directive_line("use(\"a.ts\")"));
        assert!(scanner.is_directive_line("  context( \"a.ts\" , \"b.ts\" );\r"));
        assert!(!scanner.is_directive_line("call use(\"a.ts\") here"));
        assert!(!scanner.is_directive_line("use serde"));
        assert!(!scanner.is_directive_line("reuse(\"a.ts\")"));
    }

    #[test]
    fn strip_keeps_non_directive_lines() {
        let scanner = DirectiveScanner::default();
        let text = "use(\"a.ts\")\nfoo()\n  import(\"b.ts\")\nbar()\n";
        assert_eq!(scanner.strip_directive_lines(text), "foo()\nbar()\n");
    }

    #[test]
    fn custom_names_replace_defaults() {
        let scanner = DirectiveScanner::new(&["include"]).expect("scanner");
        assert_eq!(scanner.paths("include(\"x.py\") use(\"y.py\")"), vec!["x.py"]);
        let disabled = DirectiveScanner::new::<&str>(&[]).expect("scanner");
        assert!(disabled.paths("use(\"y.py\")").is_empty());
    }
}
