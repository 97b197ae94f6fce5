/// Removes a Markdown fence wrapped around a whole answer.
///
/// Only a leading "```lang" line and a trailing "```" line are dropped; fences inside
/// the code are left alone.
#[must_use]
pub fn strip_code_fence(output: &str) -> String {
    let trimmed = output.trim();
    let Some(first_break) = trimmed.find('\n') else {
        return if trimmed.starts_with("```") {
            String::new()
        } else {
            trimmed.to_string()
        };
    };

    let (first, body) = trimmed.split_at(first_break);
    if !first.trim_start().starts_with("```") {
        return trimmed.to_string();
    }
    let body = &body[1..];
    let body = match body.rfind('\n') {
        Some(last_break) if body[last_break + 1..].trim() == "```" => &body[..last_break],
        None if body.trim() == "```" => "",
        _ => body,
    };
    body.trim_end().to_string()
}
