//! Literal prompt recognition over a growing output buffer.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// A literal phrase an agent prints when it wants confirmation, and the
/// answer that satisfies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPattern {
    #[serde(rename = "match")]
    pub needle: String,
    pub response: String,
}

impl PromptPattern {
    pub fn new(needle: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
            response: response.into(),
        }
    }
}

/// One recognized prompt occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMatch {
    /// Index of the pattern in declaration order.
    pub pattern_index: usize,
    /// Byte offset of the occurrence in the scanned buffer.
    pub offset: usize,
    pub response: String,
}

/// Finds prompt occurrences that have not been answered yet.
///
/// The pattern list is fixed; the only state is a cursor into the buffer.
/// Everything before the cursor has already been acted upon or cannot hold
/// the start of a prompt, so an occurrence is reported at most once and each
/// byte is scanned a bounded number of times. The earliest occurrence after
/// the cursor wins; patterns starting at the same offset are ranked by
/// declaration order.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    patterns: Vec<PromptPattern>,
    /// Length in bytes of the longest needle.
    longest: usize,
    cursor: usize,
}

impl PatternMatcher {
    pub fn new(patterns: Vec<PromptPattern>) -> Result<Self, ConfigError> {
        if let Some(index) = patterns.iter().position(|p| p.needle.is_empty()) {
            return Err(ConfigError::EmptyPromptPattern { index });
        }
        let longest = patterns.iter().map(|p| p.needle.len()).max().unwrap_or(0);
        Ok(Self {
            patterns,
            longest,
            cursor: 0,
        })
    }

    pub fn patterns(&self) -> &[PromptPattern] {
        &self.patterns
    }

    /// Byte offset up to which the buffer has been consumed.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Report the next unhandled prompt in `buffer`, marking it handled.
    ///
    /// `buffer` must be the same append-only text on every call within one
    /// run. Call repeatedly until `None` to drain every pending occurrence.
    pub fn next_match(&mut self, buffer: &str) -> Option<PromptMatch> {
        let pending = buffer.get(self.cursor..)?;

        let Some((pattern_index, relative)) = self
            .patterns
            .iter()
            .enumerate()
            .filter_map(|(i, p)| pending.find(&p.needle).map(|pos| (i, pos)))
            .min_by_key(|&(i, pos)| (pos, i))
        else {
            self.skip_scanned(buffer);
            return None;
        };

        let pattern = &self.patterns[pattern_index];
        let offset = self.cursor + relative;
        self.cursor = offset + pattern.needle.len();

        Some(PromptMatch {
            pattern_index,
            offset,
            response: pattern.response.clone(),
        })
    }

    /// Move the cursor to the earliest offset where a prompt could still be
    /// completed by text appended later.
    fn skip_scanned(&mut self, buffer: &str) {
        let mut resume = buffer.len().saturating_sub(self.longest.saturating_sub(1));
        while !buffer.is_char_boundary(resume) {
            resume -= 1;
        }
        self.cursor = self.cursor.max(resume);
    }

    /// Drain every pending occurrence.
    pub fn drain(&mut self, buffer: &str) -> Vec<PromptMatch> {
        std::iter::from_fn(|| self.next_match(buffer)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(patterns: &[(&str, &str)]) -> PatternMatcher {
        PatternMatcher::new(
            patterns
                .iter()
                .map(|(n, r)| PromptPattern::new(*n, *r))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_repeated_prompt_matches_once_per_occurrence() {
        let mut m = matcher(&[("Continue?", "y")]);
        let hits = m.drain("Continue? Continue?");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].offset, 0);
        assert_eq!(hits[1].offset, 10);

        // Re-scanning the same buffer never re-triggers.
        assert!(m.next_match("Continue? Continue?").is_none());
    }

    #[test]
    fn test_new_occurrence_after_growth_is_reported() {
        let mut m = matcher(&[("Continue?", "y")]);
        let mut buffer = String::from("step 1\nContinue?");
        assert_eq!(m.drain(&buffer).len(), 1);

        buffer.push_str(" ok\nstep 2\n");
        assert!(m.next_match(&buffer).is_none());

        buffer.push_str("Continue?");
        assert_eq!(m.drain(&buffer).len(), 1);
    }

    #[test]
    fn test_prompt_split_across_chunks() {
        let mut m = matcher(&[("Do you want to proceed", "y")]);
        let mut buffer = String::from("Do you want to pr");
        assert!(m.next_match(&buffer).is_none());
        buffer.push_str("oceed? [y/n]");
        let hit = m.next_match(&buffer).expect("prompt should match once complete");
        assert_eq!(hit.response, "y");
    }

    #[test]
    fn test_earliest_occurrence_wins() {
        let mut m = matcher(&[("Proceed?", "yes"), ("Continue?", "y")]);
        let hits = m.drain("Continue? then Proceed?");
        let responses: Vec<_> = hits.iter().map(|h| h.response.as_str()).collect();
        assert_eq!(responses, vec!["y", "yes"]);
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let mut m = matcher(&[("Allow", "first"), ("Allow edit", "second")]);
        let hit = m.next_match("Allow edit to main.rs?").unwrap();
        assert_eq!(hit.pattern_index, 0);
        assert_eq!(hit.response, "first");
    }

    #[test]
    fn test_no_patterns_never_matches() {
        let mut m = matcher(&[]);
        assert!(m.next_match("Continue?").is_none());
    }

    #[test]
    fn test_empty_needle_rejected() {
        let err = PatternMatcher::new(vec![
            PromptPattern::new("Continue?", "y"),
            PromptPattern::new("", "y"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyPromptPattern { index: 1 }));
    }

    #[test]
    fn test_cursor_advances_past_match() {
        let mut m = matcher(&[("y/n", "y")]);
        m.next_match("Apply? y/n").unwrap();
        assert_eq!(m.cursor(), "Apply? y/n".len());
    }

    #[test]
    fn test_cursor_skips_text_without_prompts() {
        let mut m = matcher(&[("Continue?", "y"), ("y/n", "y")]);
        let mut buffer = "a".repeat(10_000);
        assert!(m.next_match(&buffer).is_none());
        // Only the tail that could begin a "Continue?" is kept for rescanning.
        assert_eq!(m.cursor(), 10_000 - ("Continue?".len() - 1));

        buffer.push_str("Continue?");
        let hit = m.next_match(&buffer).unwrap();
        assert_eq!(hit.offset, 10_000);
    }

    #[test]
    fn test_skipped_cursor_lands_on_char_boundary() {
        let mut m = matcher(&[("Continue?", "y")]);
        let buffer = "é".repeat(20);
        assert!(m.next_match(&buffer).is_none());
        assert!(buffer.is_char_boundary(m.cursor()));
        assert!(m.cursor() > 0);
    }

    #[test]
    fn test_pattern_deserializes_from_toml_keys() {
        let p: PromptPattern = toml::from_str("match = \"Continue?\"\nresponse = \"y\"").unwrap();
        assert_eq!(p, PromptPattern::new("Continue?", "y"));
    }
}
