//! Line classifier and parser for OCR address import
//!
//! Turns a block of freeform multi-line text (typically OCR output from a
//! photographed territory sheet) into candidate address fragments. The
//! classifier is an intentional low-precision filter, not a validator:
//! lines that don't look like addresses are dropped silently.

use once_cell::sync::Lazy;
use regex::Regex;

/// Leading civic number (digits, optionally mixed with letters/hyphens)
/// followed by whitespace and the street remainder.
static CIVIC_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d[\dA-Za-z-]*)\s+(.+)$").expect("civic line pattern"));

/// One parsed line: either a split civic number + street, or a free-text
/// label when the split pattern doesn't match.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub civic_number: Option<String>,
    pub street: Option<String>,
    pub label: Option<String>,
}

/// Collapse internal whitespace runs to single spaces and trim
pub fn normalize_line(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Classifier gate: length >= 4 and at least one digit
pub fn looks_like_address_line(line: &str) -> bool {
    line.len() >= 4 && line.chars().any(|c| c.is_ascii_digit())
}

/// Parse one normalized line into civic number + street, or a label fallback
pub fn parse_line(line: &str) -> ParsedLine {
    if let Some(captures) = CIVIC_LINE.captures(line) {
        return ParsedLine {
            civic_number: Some(captures[1].to_string()),
            street: Some(captures[2].to_string()),
            label: None,
        };
    }

    ParsedLine {
        civic_number: None,
        street: None,
        label: Some(line.to_string()),
    }
}

/// Parse a whole scan block: split on any line terminator, normalize,
/// drop duplicates (exact match after normalization), classify, parse.
pub fn parse_scan_text(text: &str) -> Vec<ParsedLine> {
    let mut seen = std::collections::HashSet::new();
    let mut parsed = Vec::new();

    // Splitting on both \r and \n covers \r\n pairs too; the extra empty
    // segment between them is discarded by the empty-line check.
    for line in text.split(['\r', '\n']) {
        let normalized = normalize_line(line);
        if normalized.is_empty() || !seen.insert(normalized.clone()) {
            continue;
        }

        if !looks_like_address_line(&normalized) {
            continue;
        }

        parsed.push(parse_line(&normalized));
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_civic_number_and_street() {
        let line = parse_line("123B Main Street");
        assert_eq!(line.civic_number.as_deref(), Some("123B"));
        assert_eq!(line.street.as_deref(), Some("Main Street"));
        assert!(line.label.is_none());
    }

    #[test]
    fn hyphenated_civic_numbers_stay_whole() {
        let line = parse_line("12-14 Elm Street");
        assert_eq!(line.civic_number.as_deref(), Some("12-14"));
        assert_eq!(line.street.as_deref(), Some("Elm Street"));
    }

    #[test]
    fn unsplittable_line_becomes_label() {
        let line = parse_line("Apt 4 ring twice");
        assert!(line.civic_number.is_none());
        assert!(line.street.is_none());
        assert_eq!(line.label.as_deref(), Some("Apt 4 ring twice"));
    }

    #[test]
    fn no_digit_lines_are_dropped_not_labeled() {
        let parsed = parse_scan_text("Corner store behind the church");
        assert!(parsed.is_empty());
    }

    #[test]
    fn short_lines_are_dropped() {
        assert!(!looks_like_address_line("1 a"));
        assert!(looks_like_address_line("1 av"));
    }

    #[test]
    fn whitespace_runs_normalize_before_dedup() {
        let parsed = parse_scan_text("123 Main St\n123   Main St");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].street.as_deref(), Some("Main St"));
    }

    #[test]
    fn dedup_is_case_sensitive() {
        let parsed = parse_scan_text("123 Main St\n123 MAIN ST");
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn splits_on_all_line_terminators() {
        let parsed = parse_scan_text("100 Oak St\r\n200 Elm St\r300 Pine St\n400 Birch St");
        assert_eq!(parsed.len(), 4);
    }

    #[test]
    fn scan_block_end_to_end() {
        let parsed = parse_scan_text(
            "100 Oak Street\n100 Oak Street\nno visible text\n102B Oak Street",
        );
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].civic_number.as_deref(), Some("100"));
        assert_eq!(parsed[1].civic_number.as_deref(), Some("102B"));
    }
}
