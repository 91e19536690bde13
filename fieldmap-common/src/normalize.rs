//! Place and street name normalization
//!
//! One folding function shared by the street-geometry cache key and the
//! street-lookup city filter, so both compare names the same way:
//! lowercase, Unicode-decompose and drop combining marks, collapse every
//! non-alphanumeric run to a single space, trim.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fold a place or street name into its comparison form.
///
/// `"Rue de l'Église"` and `"rue de l eglise"` normalize identically.
/// Empty or punctuation-only input folds to the empty string.
pub fn normalize_place_name(value: &str) -> String {
    let lowered = value.trim().to_lowercase();

    let mut out = String::with_capacity(lowered.len());
    let mut last_was_space = true; // suppress leading separator

    for c in lowered.nfd() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_space = false;
        } else if c.is_alphanumeric() {
            // Non-ASCII letters with no decomposition (e.g. CJK) pass through
            out.push(c);
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }

    while out.ends_with(' ') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_trims() {
        assert_eq!(normalize_place_name("  Main Street  "), "main street");
    }

    #[test]
    fn strips_diacritics() {
        assert_eq!(normalize_place_name("Montréal"), "montreal");
        assert_eq!(normalize_place_name("Rue de l'Église"), "rue de l eglise");
        assert_eq!(normalize_place_name("Curaçao"), "curacao");
    }

    #[test]
    fn collapses_punctuation_runs_to_single_spaces() {
        assert_eq!(normalize_place_name("St-Jean--Baptiste"), "st jean baptiste");
        assert_eq!(normalize_place_name("oak  /  elm"), "oak elm");
    }

    #[test]
    fn empty_and_punctuation_only_fold_to_empty() {
        assert_eq!(normalize_place_name(""), "");
        assert_eq!(normalize_place_name("  --- "), "");
    }

    #[test]
    fn equivalent_spellings_match() {
        assert_eq!(
            normalize_place_name("Trois-Rivières"),
            normalize_place_name("trois rivieres")
        );
    }
}
