//! Best-effort handling of per-chunk graph fragments.
//!
//! Fragments originate from free-form model output, so everything here is
//! lenient: extraction scans for a brace-delimited block, parsing maps any
//! malformed input to an empty fragment, and relation types are normalized
//! to a restricted token alphabet.

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{EntityNode, RelationshipEdge};

/// Default relation type for empty or missing input
pub const DEFAULT_REL_TYPE: &str = "RELATED_TO";

/// Entities and relationships local to one chunk, as stored alongside it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphFragment {
    #[serde(default)]
    pub entities: Vec<EntityNode>,
    #[serde(default)]
    pub relationships: Vec<RelationshipEdge>,
}

impl GraphFragment {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

/// Capture the largest brace-delimited block from free-form model output.
///
/// Returns None when the text contains no `{...}` block at all.
pub fn extract_json_block(s: &str) -> Option<&str> {
    let re = Regex::new(r"(?s)\{.*\}").expect("valid pattern");
    re.find(s).map(|m| m.as_str())
}

/// Parse a stored graph fragment.
///
/// Malformed or empty input yields an empty fragment — never an error. A
/// corrupt fragment must not prevent the chunk text itself from being used.
pub fn parse_graph_fragment(raw: &str) -> GraphFragment {
    if raw.trim().is_empty() {
        return GraphFragment::default();
    }
    match serde_json::from_str(raw) {
        Ok(fragment) => fragment,
        Err(e) => {
            log::warn!("Could not parse graph fragment, substituting empty: {}", e);
            GraphFragment::default()
        }
    }
}

/// Normalize a relationship type into an uppercase token containing only
/// letters, digits, and underscores. Empty input maps to [`DEFAULT_REL_TYPE`].
pub fn sanitize_rel_type(rel_type: &str) -> String {
    let rel_type = rel_type.trim();
    if rel_type.is_empty() {
        return DEFAULT_REL_TYPE.to_string();
    }
    let re = Regex::new(r"[^A-Za-z0-9_]+").expect("valid pattern");
    re.replace_all(&rel_type.to_uppercase(), "_").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_uppercases() {
        assert_eq!(sanitize_rel_type("evaluated_on"), "EVALUATED_ON");
        assert_eq!(sanitize_rel_type("Uses Method"), "USES_METHOD");
    }

    #[test]
    fn test_sanitize_strips_punctuation() {
        assert_eq!(sanitize_rel_type("based-on!"), "BASED_ON_");
        assert_eq!(sanitize_rel_type("a  b\tc"), "A_B_C");
    }

    #[test]
    fn test_sanitize_keeps_digits() {
        assert_eq!(sanitize_rel_type("top5"), "TOP5");
    }

    #[test]
    fn test_sanitize_empty_is_default() {
        assert_eq!(sanitize_rel_type(""), DEFAULT_REL_TYPE);
        assert_eq!(sanitize_rel_type("   "), DEFAULT_REL_TYPE);
    }

    #[test]
    fn test_sanitize_only_allowed_chars() {
        for input in ["x → y", "Uses/Method", "émigré", "a.b.c"] {
            let out = sanitize_rel_type(input);
            assert!(
                out.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'),
                "unexpected char in {:?}",
                out
            );
        }
    }

    #[test]
    fn test_extract_json_block_plain() {
        let s = r#"{"entities": []}"#;
        assert_eq!(extract_json_block(s), Some(s));
    }

    #[test]
    fn test_extract_json_block_wrapped_in_prose() {
        let s = "Here is the JSON you asked for:\n{\"entities\": []}\nHope that helps!";
        assert_eq!(extract_json_block(s), Some("{\"entities\": []}"));
    }

    #[test]
    fn test_extract_json_block_spans_nested_braces() {
        let s = "x {\"a\": {\"b\": 1}} y";
        assert_eq!(extract_json_block(s), Some("{\"a\": {\"b\": 1}}"));
    }

    #[test]
    fn test_extract_json_block_none() {
        assert_eq!(extract_json_block("no json here"), None);
        assert_eq!(extract_json_block(""), None);
    }

    #[test]
    fn test_parse_valid_fragment() {
        let raw = r#"{
            "entities": [{"name": "BERT", "type": "Tool"}],
            "relationships": [{"source": "BERT", "target": "SQuAD", "type": "EVALUATED_ON"}]
        }"#;
        let fragment = parse_graph_fragment(raw);
        assert_eq!(fragment.entities.len(), 1);
        assert_eq!(fragment.entities[0].name, "BERT");
        assert_eq!(fragment.entities[0].entity_type, "Tool");
        assert_eq!(fragment.relationships.len(), 1);
        assert_eq!(fragment.relationships[0].rel_type, "EVALUATED_ON");
    }

    #[test]
    fn test_parse_accepts_id_field() {
        // Fragments written back by ingest carry the wire field name
        let raw = r#"{"entities": [{"id": "SQuAD", "type": "Dataset"}], "relationships": []}"#;
        let fragment = parse_graph_fragment(raw);
        assert_eq!(fragment.entities[0].name, "SQuAD");
    }

    #[test]
    fn test_parse_malformed_is_empty() {
        assert!(parse_graph_fragment("{not json").is_empty());
        assert!(parse_graph_fragment("[1, 2, 3]").is_empty());
    }

    #[test]
    fn test_parse_empty_is_empty() {
        assert!(parse_graph_fragment("").is_empty());
        assert!(parse_graph_fragment("   ").is_empty());
    }

    #[test]
    fn test_parse_missing_keys_default() {
        let fragment = parse_graph_fragment("{}");
        assert!(fragment.is_empty());
    }
}
