//! Keyword section of generated answers.
//!
//! The answer service is asked to end its answer with a line such as
//! `**Keywords:** 'net income', 'Q3'`. The quoted terms drive keyword
//! highlighting and are removed from the text shown to the user.

use once_cell::sync::Lazy;
use regex::Regex;

static KEYWORD_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\*\*keywords:\*\*\s*(.+)").expect("Invalid keyword line regex pattern")
});

static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'([^']+)'").expect("Invalid quoted keyword regex pattern"));

static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\*\*keywords:\*\*").expect("Invalid keyword marker regex pattern"));

/// Quoted keywords following the first `**Keywords:**` marker.
///
/// Returns an empty vector when the marker is missing or quotes nothing.
pub fn extract_keywords(answer: &str) -> Vec<String> {
    let Some(line) = KEYWORD_LINE.captures(answer).and_then(|c| c.get(1)) else {
        return Vec::new();
    };
    QUOTED
        .captures_iter(line.as_str())
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Answer text before the first `**Keywords:**` marker, trimmed.
pub fn strip_keywords(answer: &str) -> String {
    MARKER
        .split(answer)
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANSWER: &str = "Net income rose 12% in Q3.\n\n**Keywords:** 'net income', 'Q3', '12%'";

    #[test]
    fn test_extract_keywords() {
        assert_eq!(extract_keywords(ANSWER), vec!["net income", "Q3", "12%"]);
    }

    #[test]
    fn test_marker_is_case_insensitive() {
        assert_eq!(
            extract_keywords("text **KEYWORDS:** 'a' and 'b'"),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_missing_section() {
        assert!(extract_keywords("No keywords here").is_empty());
        assert!(extract_keywords("**Keywords:** none quoted").is_empty());
        assert_eq!(strip_keywords("  plain answer \n"), "plain answer");
    }

    #[test]
    fn test_strip_keywords() {
        assert_eq!(strip_keywords(ANSWER), "Net income rose 12% in Q3.");
    }
}
