//! Window title normalization and matching

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::WindowSettings;

static INVISIBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\u{200B}-\u{200D}\u{FEFF}\u{2000}-\u{200A}\u{2028}-\u{2029}]")
        .expect("invisible character pattern")
});

static NON_PRINTABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^\x20-\x7E\u{00A0}-\u{FFFF}]").expect("printable range pattern")
});

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Titles that look like a path, script or macro tool are never the game
const SUSPICIOUS_FRAGMENTS: [&str; 5] = ["\\", "/", ".py", ".exe", "macro"];

/// Longest title the prefix fallback accepts
const FALLBACK_MAX_LEN: usize = 50;

/// Strip invisible Unicode and collapse whitespace
pub fn clean_window_title(title: &str) -> String {
    let cleaned = INVISIBLE.replace_all(title, "");
    let cleaned = NON_PRINTABLE.replace_all(&cleaned, "");
    WHITESPACE.replace_all(&cleaned, " ").trim().to_string()
}

fn alphanumeric(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Decides whether a foreground window title belongs to the game
#[derive(Debug, Clone)]
pub struct TitleMatcher {
    /// Target with everything but `[a-z0-9]` removed
    compact: String,
    /// Target words, lowercase
    words: Vec<String>,
    excluded: Vec<String>,
    /// Target words separated by optional space, dash or colon
    pattern: Option<Regex>,
}

impl TitleMatcher {
    pub fn new(target: &str, excluded: &[String]) -> Self {
        let lower = target.to_lowercase();
        let words: Vec<String> = lower.split_whitespace().map(alphanumeric).collect();

        let joined = words
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join(r"[\s\-:]*");
        let pattern = match Regex::new(&format!(r"\b{}\b", joined)) {
            Ok(re) => Some(re),
            Err(e) => {
                log::warn!("Invalid title pattern for '{}': {}", target, e);
                None
            }
        };

        Self {
            compact: alphanumeric(&lower),
            words,
            excluded: excluded.iter().map(|k| k.to_lowercase()).collect(),
            pattern,
        }
    }

    pub fn from_settings(settings: &WindowSettings) -> Self {
        Self::new(&settings.target_title, &settings.excluded_keywords)
    }

    pub fn matches(&self, title: &str) -> bool {
        if self.compact.is_empty() {
            return false;
        }

        // The raw title wins before any exclusion so the bare game title is
        // accepted even when a keyword happens to be a substring of it
        if alphanumeric(&title.to_lowercase()) == self.compact {
            return true;
        }

        let title = clean_window_title(title).to_lowercase();
        if self.excluded.iter().any(|k| title.contains(k.as_str())) {
            return false;
        }

        if alphanumeric(&title) == self.compact {
            return true;
        }

        let spaced: String = title
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
            .collect();
        if spaced == self.words.join(" ") {
            return true;
        }

        if self.pattern.as_ref().is_some_and(|re| re.is_match(&title)) {
            return true;
        }

        // Short titles that start with the first word and contain the last
        match (self.words.first(), self.words.last()) {
            (Some(first), Some(last)) => {
                title.len() < FALLBACK_MAX_LEN
                    && title.starts_with(first.as_str())
                    && title.contains(last.as_str())
                    && !SUSPICIOUS_FRAGMENTS.iter().any(|f| title.contains(f))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(excluded: &[&str]) -> TitleMatcher {
        let excluded: Vec<String> = excluded.iter().map(|s| s.to_string()).collect();
        TitleMatcher::new("ARC Raiders", &excluded)
    }

    #[test]
    fn test_clean_strips_invisible_characters() {
        assert_eq!(clean_window_title("ARC\u{200B} Raiders\u{FEFF}"), "ARC Raiders");
        assert_eq!(clean_window_title("  ARC \t\n  Raiders  "), "ARC Raiders");
        assert_eq!(clean_window_title("ARC\u{2028}Raiders\u{0007}"), "ARCRaiders");
    }

    #[test]
    fn test_exact_title_matches() {
        let m = TitleMatcher::from_settings(&WindowSettings::default());
        assert!(m.matches("ARC Raiders"));
        assert!(m.matches("ARC\u{200B}Raiders"));
        assert!(m.matches("arc-raiders"));
    }

    #[test]
    fn test_excluded_keywords_reject() {
        let m = TitleMatcher::from_settings(&WindowSettings::default());
        assert!(!m.matches("arc_raiders/src/main.rs - Visual Studio Code"));
        assert!(!m.matches("ARC Raiders notes - Notepad"));
        assert!(!m.matches("Desktop"));
    }

    #[test]
    fn test_patterns_and_prefix_fallback() {
        let m = matcher(&["notepad"]);
        assert!(m.matches("ARC Raiders - Season 1"));
        assert!(m.matches("arc: raiders"));
        assert!(m.matches("ARCRaiders (DX12)"));
        assert!(m.matches("arcade raiders"));
        assert!(!m.matches("arcade raiders macro"));
        assert!(!m.matches("C:\\games\\arc raidersx"));
        assert!(!m.matches("Raiders of the lost ARC"));
    }

    #[test]
    fn test_empty_target_matches_nothing() {
        let m = TitleMatcher::new("", &[]);
        assert!(!m.matches(""));
        assert!(!m.matches("anything"));
    }
}
