//! Case-insensitive keyword detection for log lines.

/// Keywords watched for when none are configured.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "Exception",
    "Error",
    "Failure",
    "Fail",
    "Fatal",
    "Issue",
    "Crash",
    "Close",
    "Cannot",
    "Wrong",
    "unsupported",
    "not found",
    "retry",
    "terminated",
    "disconnected",
];

/// Returns `true` if any keyword, lower-cased, is a substring of the
/// lower-cased `line`.
///
/// An empty keyword list never matches. An empty keyword string is ignored
/// rather than matching everything.
pub fn matches<S: AsRef<str>>(line: &str, keywords: &[S]) -> bool {
    let line = line.to_lowercase();
    keywords.iter().any(|keyword| {
        let keyword = keyword.as_ref();
        !keyword.is_empty() && line.contains(&keyword.to_lowercase())
    })
}

/// Keyword set with its case-folded forms computed once.
///
/// Observable behaviour is identical to [`matches`]; this only avoids
/// lower-casing every keyword on every line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
    folded: Vec<String>,
}

impl KeywordMatcher {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(Into::into)
            .filter(|k| !k.is_empty())
            .collect();
        let folded = keywords.iter().map(|k| k.to_lowercase()).collect();

        KeywordMatcher { keywords, folded }
    }

    pub fn keywords(&self) -> &[String] {
        self.keywords.as_slice()
    }

    pub fn is_match(&self, line: &str) -> bool {
        let line = line.to_lowercase();
        self.folded.iter().any(|k| line.contains(k.as_str()))
    }

    /// Returns the configured keywords found in `line`, in configuration
    /// order. Empty when the line does not match.
    pub fn matched_keywords(&self, line: &str) -> Vec<String> {
        let line = line.to_lowercase();
        self.keywords
            .iter()
            .zip(&self.folded)
            .filter(|(_, folded)| line.contains(folded.as_str()))
            .map(|(keyword, _)| keyword.clone())
            .collect()
    }
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        KeywordMatcher::new(DEFAULT_KEYWORDS.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive() {
        assert!(matches("ERROR: disk full", &["error"]));
        assert!(matches("an error occurred", &["Error"]));
        assert!(matches("NullPointerEXCEPTION", &["exception"]));
        assert!(!matches("all good", &["error", "fatal"]));
    }

    #[test]
    fn test_multi_word_keyword() {
        assert!(matches("user Not Found in cache", &["not found"]));
        assert!(!matches("not yet found", &["not found"]));
    }

    #[test]
    fn test_empty_inputs() {
        let none: [&str; 0] = [];
        assert!(!matches("", DEFAULT_KEYWORDS));
        assert!(!matches("ERROR", &none));
        assert!(!matches("anything", &[""]));
    }

    #[test]
    fn test_matcher_agrees_with_fn() {
        let matcher = KeywordMatcher::default();
        let lines = [
            "",
            "started ok",
            "connection closed by peer",
            "Retrying in 5s",
            "request FAILED",
            "listening on :8080",
        ];
        for line in lines {
            assert_eq!(matcher.is_match(line), matches(line, DEFAULT_KEYWORDS), "{line}");
        }
    }

    #[test]
    fn test_matched_keywords() {
        let matcher = KeywordMatcher::default();
        assert_eq!(
            matcher.matched_keywords("Fatal error: connection failure"),
            vec!["Error", "Failure", "Fail", "Fatal"]
        );
        assert!(matcher.matched_keywords("all quiet").is_empty());
    }

    #[test]
    fn test_empty_keywords_filtered() {
        let matcher = KeywordMatcher::new(vec!["", "boom"]);
        assert_eq!(matcher.keywords(), &["boom".to_string()]);
        assert!(!matcher.is_match("quiet"));
        assert!(KeywordMatcher::new(Vec::<String>::new()).matched_keywords("x").is_empty());
    }
}
