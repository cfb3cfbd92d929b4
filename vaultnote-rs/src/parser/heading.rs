//! Heading text extraction and slug generation.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

// ATX heading with an optional closing sequence of hashes.
static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(#{1,6})[ \t]+(.*?)(?:[ \t]+#+)?[ \t]*$").unwrap()
});

/// Extract the level and text of a heading line body.
pub fn heading_text(body: &str) -> Option<(u8, String)> {
    let caps = HEADING.captures(body)?;
    let level = caps.get(1)?.as_str().len() as u8;
    let text = caps.get(2)?.as_str().trim().to_string();
    Some((level, text))
}

/// Generate a URL-safe slug from heading text.
///
/// - Normalize unicode
/// - Convert to lowercase
/// - Replace spaces with hyphens
/// - Remove special characters (keep alphanumeric, hyphens, underscores)
/// - Collapse multiple hyphens
pub fn slugify(text: &str) -> String {
    let normalized: String = text.nfc().collect();

    let mut slug = String::new();
    let mut last_was_hyphen = false;

    for c in normalized.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_was_hyphen = false;
        } else if c == '-' || c == '_' || c.is_whitespace() {
            if !last_was_hyphen && !slug.is_empty() {
                slug.push(if c == '_' { '_' } else { '-' });
                last_was_hyphen = c != '_';
            }
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    slug
}
