//! Placeholder analysis for query cells.

use std::sync::LazyLock;

use regex::Regex;

use super::Analysis;

/// `{{ name }}` placeholder pattern; whitespace inside the braces is allowed.
pub static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern")
});

/// Query cells define nothing; their refs are the placeholder names.
pub fn analyze(code: &str) -> Analysis {
    let refs = PLACEHOLDER
        .captures_iter(code)
        .map(|captures| captures[1].to_string())
        .collect();
    Analysis {
        defs: Default::default(),
        refs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(code: &str) -> Vec<String> {
        analyze(code).refs.into_iter().collect()
    }

    #[test]
    fn test_extracts_placeholders() {
        assert_eq!(
            refs("SELECT * FROM users WHERE id = {{user_id}}"),
            vec!["user_id"]
        );
    }

    #[test]
    fn test_whitespace_inside_braces() {
        assert_eq!(refs("SELECT {{  a  }}, {{b}}"), vec!["a", "b"]);
    }

    #[test]
    fn test_duplicates_collapse() {
        assert_eq!(refs("SELECT {{x}}, {{x}}"), vec!["x"]);
    }

    #[test]
    fn test_invalid_placeholders_ignored() {
        assert!(refs("SELECT {{1x}}, {x}, {{}}").is_empty());
    }

    #[test]
    fn test_defs_always_empty() {
        assert!(analyze("SELECT 1").defs.is_empty());
    }
}
