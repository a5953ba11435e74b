//! Transcript to on/off decision.

use crate::config::KeywordConfig;
use crate::pipeline::types::Direction;

/// Ordered list of substrings that must all appear in a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSet {
    tokens: Vec<String>,
}

impl KeywordSet {
    /// Builds a set; tokens are lower-cased, blank ones dropped.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens = tokens
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { tokens }
    }

    /// True when every token occurs somewhere in `transcript`.
    ///
    /// `transcript` must already be lower-cased. An empty set never matches.
    pub fn matches(&self, transcript: &str) -> bool {
        !self.tokens.is_empty() && self.tokens.iter().all(|t| transcript.contains(t.as_str()))
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

/// Classifies transcripts against the on and off keyword sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatcher {
    on: KeywordSet,
    off: KeywordSet,
}

impl KeywordMatcher {
    pub fn new(on: KeywordSet, off: KeywordSet) -> Self {
        Self { on, off }
    }

    /// Case-insensitive, order-insensitive substring matching.
    ///
    /// Returns `None` when the transcript matches neither set or both.
    pub fn classify(&self, transcript: &str) -> Option<Direction> {
        let text = transcript.to_lowercase();
        match (self.on.matches(&text), self.off.matches(&text)) {
            (true, false) => Some(Direction::On),
            (false, true) => Some(Direction::Off),
            _ => None,
        }
    }
}

impl From<&KeywordConfig> for KeywordMatcher {
    fn from(config: &KeywordConfig) -> Self {
        Self::new(KeywordSet::new(&config.on), KeywordSet::new(&config.off))
    }
}
