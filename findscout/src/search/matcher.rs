use regex::bytes::Regex as BytesRegex;
use regex::Regex;
use std::borrow::Cow;

use crate::errors::SearchResult;

/// A compiled search or ignore pattern.
///
/// Names are matched as text; file lines are matched as raw bytes so that
/// files which are not valid UTF-8 can still be searched.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    text: Regex,
    bytes: BytesRegex,
}

impl PatternMatcher {
    /// Compiles `pattern`, failing with [`crate::SearchError::InvalidPattern`]
    pub fn new(pattern: &str) -> SearchResult<Self> {
        Ok(Self {
            text: Regex::new(pattern)?,
            bytes: BytesRegex::new(pattern)?,
        })
    }

    /// The pattern source
    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.text.is_match(text)
    }

    pub fn is_match_bytes(&self, bytes: &[u8]) -> bool {
        self.bytes.is_match(bytes)
    }

    /// Rewrites every match in `text` through `decorate`.
    pub fn highlight<'t, F>(&self, text: &'t str, decorate: F) -> Cow<'t, str>
    where
        F: Fn(&str) -> String,
    {
        self.text
            .replace_all(text, |caps: &regex::Captures| decorate(&caps[0]))
    }
}
