//! Predicates used by the walker, the dispatch stage and the content scanner.
use crate::config::CompiledConfig;

/// Number of leading bytes inspected by [`is_binary`].
pub const BINARY_SAMPLE_LEN: usize = 256;

/// Bytes below this value (NUL through BS) are control codes that never occur in text.
const CONTROL_CODE_LIMIT: u8 = 0x09;

/// Marks hidden entries on Unix-like systems.
pub const HIDDEN_MARKER: char = '.';

/// Classifies file content as binary by looking for control codes in its first
/// [`BINARY_SAMPLE_LEN`] bytes.
pub fn is_binary(content: &[u8]) -> bool {
    let sample = &content[..content.len().min(BINARY_SAMPLE_LEN)];
    sample.iter().any(|&b| b < CONTROL_CODE_LIMIT)
}

pub fn is_hidden(base_name: &str) -> bool {
    base_name.starts_with(HIDDEN_MARKER)
}

/// Whether the walker drops a child (and its whole subtree) before emitting it.
pub fn should_prune(base_name: &str, config: &CompiledConfig) -> bool {
    if !config.scope.hidden && is_hidden(base_name) {
        return true;
    }
    config
        .ignore
        .as_ref()
        .is_some_and(|ignore| ignore.is_match(base_name))
}

/// Whether a file line counts as a hit.
pub fn line_matches(line: &[u8], config: &CompiledConfig) -> bool {
    config.pattern.is_match_bytes(line)
        && !config
            .ignore
            .as_ref()
            .is_some_and(|ignore| ignore.is_match_bytes(line))
}
