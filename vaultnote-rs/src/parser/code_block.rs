//! Fenced code block detection, so checklist-looking lines inside code are
//! left alone.

use regex::Regex;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

// Matches the opening of a fenced code block: ``` or ~~~ at start of line
static FENCE_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(`{3,}|~{3,})").unwrap());

/// Find fenced code blocks in a sequence of line bodies (terminators stripped).
///
/// Returned ranges are inclusive line indices covering the opening fence, the
/// code, and the closing fence. An opener without a matching closing fence is
/// not a code block.
pub fn find_fenced_ranges(bodies: &[&str]) -> Vec<RangeInclusive<usize>> {
    let mut ranges = Vec::new();
    let mut idx = 0;

    while idx < bodies.len() {
        let Some(open) = FENCE_OPEN.find(bodies[idx]) else {
            idx += 1;
            continue;
        };

        let fence = open.as_str();
        let fence_char = fence.chars().next().unwrap_or('`');
        let close_at = (idx + 1..bodies.len()).find(|&j| is_closing_fence(bodies[j], fence_char, fence.len()));

        match close_at {
            Some(end) => {
                ranges.push(idx..=end);
                idx = end + 1;
            }
            None => idx += 1,
        }
    }

    ranges
}

/// A closing fence is made only of fence characters (at least as many as the
/// opener), optionally surrounded by whitespace.
fn is_closing_fence(body: &str, fence_char: char, min_len: usize) -> bool {
    let trimmed = body.trim();
    trimmed.len() >= min_len && trimmed.chars().all(|c| c == fence_char)
}

/// Check if a line index is inside any fenced range.
pub fn is_line_fenced(line: usize, ranges: &[RangeInclusive<usize>]) -> bool {
    ranges.iter().any(|r| r.contains(&line))
}
