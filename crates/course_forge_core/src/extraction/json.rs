//! Recovering a JSON document from free-form model output.

use super::ExtractionError;
use crate::domain::StructureTree;

/// Removes a surrounding markdown code fence, if present.
///
/// Handles ```` ```json … ``` ````, a bare ```` ``` … ``` ```` and unfenced text.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (`json`, `JSON`, ...) on the opening fence line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };

    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Finds the most plausible JSON object span inside `raw`.
///
/// A fenced block anywhere in the text wins; otherwise the span from the first
/// `{` to the last `}` is returned.
pub fn extract_json_span(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let after_info = match after_fence.find('\n') {
            Some(newline) => &after_fence[newline + 1..],
            None => after_fence,
        };
        if let Some(end) = after_info.find("```") {
            let block = after_info[..end].trim();
            if block.starts_with('{') {
                return Some(block);
            }
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&trimmed[start..=end]),
        _ => None,
    }
}

/// Deserializes a structure tree, mapping serde failures into [`ExtractionError::Parse`].
pub fn parse_tree(json: &str) -> Result<StructureTree, ExtractionError> {
    serde_json::from_str(json).map_err(|e| ExtractionError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE: &str = r#"{"course_title":"Rust","modules":[{"module_number":1,"title":"Basics","chapters":[{"chapter_number":1,"title":"Ownership","materials":[{"type":"slide","title":"Moves"}]}]}]}"#;

    #[test]
    fn strips_json_fence() {
        let fenced = format!("```json\n{}\n```", TREE);
        assert_eq!(strip_code_fences(&fenced), TREE);
    }

    #[test]
    fn strips_bare_fence() {
        let fenced = format!("```\n{}\n```\n", TREE);
        assert_eq!(strip_code_fences(&fenced), TREE);
    }

    #[test]
    fn leaves_raw_json_alone() {
        assert_eq!(strip_code_fences(&format!("  {}  ", TREE)), TREE);
    }

    #[test]
    fn fenced_and_raw_parse_identically() {
        let fenced = format!("```json\n{}\n```", TREE);
        let a = parse_tree(strip_code_fences(&fenced)).unwrap();
        let b = parse_tree(strip_code_fences(TREE)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn span_falls_back_to_braces() {
        let chatty = format!("Sure! Here is the structure:\n{}\nLet me know.", TREE);
        assert_eq!(extract_json_span(&chatty), Some(TREE));
    }

    #[test]
    fn span_prefers_fenced_block() {
        let chatty = format!("Notes {{ not json }}\n```json\n{}\n```", TREE);
        assert_eq!(extract_json_span(&chatty), Some(TREE));
    }

    #[test]
    fn span_absent_without_braces() {
        assert_eq!(extract_json_span("I cannot help with that."), None);
    }
}
