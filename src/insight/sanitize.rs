//! Disallowed-keyword sanitizer.
//!
//! The model is instructed never to diagnose disease, but instructions are
//! not guarantees — this is the enforcement backstop, run over every
//! free-text field of a generated [`crate::types::Insight`] before it is
//! persisted.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::defaults::insight::DISALLOWED_KEYWORDS;

static DISALLOWED_RE: OnceLock<Regex> = OnceLock::new();

fn disallowed_regex() -> &'static Regex {
    DISALLOWED_RE.get_or_init(|| {
        let alternation = DISALLOWED_KEYWORDS.join("|");
        Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("disallowed-keyword pattern is a fixed valid regex")
    })
}

/// Replace every case-insensitive, whole-word occurrence of a disallowed
/// keyword with `condition`, preserving everything else in `text` verbatim.
pub fn sanitize(text: &str) -> String {
    disallowed_regex().replace_all(text, "condition").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_disallowed_keyword_case_insensitively() {
        assert_eq!(sanitize("Watch for Fungus on the leaves"), "Watch for condition on the leaves");
    }

    #[test]
    fn leaves_unrelated_text_untouched() {
        assert_eq!(sanitize("Soil moisture is trending downward"), "Soil moisture is trending downward");
    }

    #[test]
    fn replaces_multiple_keywords_in_one_pass() {
        assert_eq!(sanitize("possible virus or bacteria present"), "possible condition or condition present");
    }

    #[test]
    fn does_not_replace_inside_unrelated_words() {
        assert_eq!(sanitize("the rotunda needs repainting"), "the rotunda needs repainting");
    }
}
