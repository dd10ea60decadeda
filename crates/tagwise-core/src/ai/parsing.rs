//! Parsing helpers for model replies
//!
//! Categorization replies are plain text, one `Product-Tag` pair per line.
//! Models often add bullets, numbering or chatter; anything that does not
//! reduce to a pair is dropped with a warning.

use tracing::warn;

use crate::models::TagSuggestion;

/// Longest slice of a bad line quoted in a warning
const MAX_LOGGED_LINE: usize = 120;

fn truncate_for_log(line: &str) -> String {
    if line.chars().count() > MAX_LOGGED_LINE {
        format!("{}...", line.chars().take(MAX_LOGGED_LINE).collect::<String>())
    } else {
        line.to_string()
    }
}

/// Parse one reply line into a suggestion
///
/// Leading and trailing dashes and whitespace are stripped, then the line is
/// split on its first `-`. Returns None for lines with no `-` or an empty half.
pub fn parse_tag_line(line: &str) -> Option<TagSuggestion> {
    let cleaned = line.trim_matches(|c: char| c == '-' || c.is_whitespace());
    let (product, tag) = cleaned.split_once('-')?;
    let product = product.trim();
    let tag = tag.trim();

    if product.is_empty() || tag.is_empty() {
        return None;
    }

    Some(TagSuggestion {
        product: product.to_string(),
        tag: tag.to_string(),
    })
}

/// Parse every usable `Product-Tag` pair from a reply
///
/// Blank lines are skipped silently; malformed lines are logged and skipped.
pub fn parse_tag_suggestions(reply: &str) -> Vec<TagSuggestion> {
    let mut suggestions = Vec::new();

    for line in reply.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_tag_line(line) {
            Some(s) => suggestions.push(s),
            None => warn!("Skipping malformed tag line: {:?}", truncate_for_log(line)),
        }
    }

    suggestions
}
