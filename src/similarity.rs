//! Similarity kernel (S) — token-bigram Dice similarity over names and
//! strings, corporate-suffix normalization, and nickname/initials matching.
//! Stateless: every function here is a pure function of its arguments.
//!
//! Grounded on the teacher's keyword/context matching in
//! `aetherlight-core/src/matching.rs` (`calculate_keyword_overlap`,
//! `calculate_context_match`): same "normalize, tokenize, score in [0,1]"
//! shape, generalized from substring/tag matching to Sørensen-Dice bigram
//! overlap plus the nickname/initials escape hatches spec §4.1 calls for.

use std::collections::HashSet;

const CORPORATE_SUFFIXES: &[&str] = &[".com", "inc", "llc", "corp", "ltd"];

/// Case-insensitive, whitespace-normalized bigram (character-level) string.
fn bigrams(s: &str) -> HashSet<(char, char)> {
    let normalized: Vec<char> = s
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if normalized.len() < 2 {
        return HashSet::new();
    }
    normalized.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Sørensen-Dice similarity over character bigrams, in `[0.0, 1.0]`.
/// Empty strings compare to 0.0 (spec §4.1 edge case).
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.trim().is_empty() || b.trim().is_empty() {
        return 0.0;
    }
    let ba = bigrams(a);
    let bb = bigrams(b);
    if ba.is_empty() || bb.is_empty() {
        // Single-token / single-character names: fall back to exact
        // case-insensitive comparison rather than reporting 0 similarity
        // for two identical one-letter strings.
        return if a.trim().eq_ignore_ascii_case(b.trim()) {
            1.0
        } else {
            0.0
        };
    }
    let intersection = ba.intersection(&bb).count();
    (2 * intersection) as f64 / (ba.len() + bb.len()) as f64
}

/// Strip common corporate suffixes/TLDs for normalized business-name comparison.
pub fn normalize_business_name(name: &str) -> String {
    let mut lower = name.trim().to_lowercase();
    for suffix in CORPORATE_SUFFIXES {
        if let Some(stripped) = lower.strip_suffix(suffix) {
            lower = stripped.trim().trim_end_matches(',').trim().to_string();
        }
    }
    lower
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(name: &str) -> Vec<String> {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn initials(name: &str) -> Vec<char> {
    tokens(name)
        .into_iter()
        .filter_map(|t| t.chars().next())
        .collect()
}

/// True if `a` and `b` are likely the same name via Dice>0.85, matching
/// initials, or one being a token subset of the other (nicknames /
/// abbreviations), per spec §4.1.
pub fn names_likely_match(a: &str, b: &str) -> bool {
    if a.trim().is_empty() || b.trim().is_empty() {
        return false;
    }
    if similarity(a, b) > 0.85 {
        return true;
    }
    let init_a = initials(a);
    let init_b = initials(b);
    if !init_a.is_empty() && init_a == init_b {
        return true;
    }
    let tok_a: HashSet<String> = tokens(a).into_iter().collect();
    let tok_b: HashSet<String> = tokens(b).into_iter().collect();
    if tok_a.is_empty() || tok_b.is_empty() {
        return false;
    }
    tok_a.is_subset(&tok_b) || tok_b.is_subset(&tok_a)
}

/// True if any pair across the two name lists is a likely match.
pub fn any_names_likely_match(incoming: &[String], existing: &[String]) -> bool {
    incoming
        .iter()
        .any(|a| existing.iter().any(|b| names_likely_match(a, b)))
}

/// Max Dice similarity across all incoming x existing name pairs.
pub fn max_name_similarity(incoming: &[String], existing: &[String]) -> f64 {
    incoming
        .iter()
        .flat_map(|a| existing.iter().map(move |b| similarity(a, b)))
        .fold(0.0_f64, f64::max)
}

/// Fractional token overlap (Jaccard-ish but over a single direction) for
/// location/partial matching: `|shared| / |union|`.
pub fn token_overlap_ratio(a: &str, b: &str) -> f64 {
    let tok_a: HashSet<String> = tokens(a).into_iter().collect();
    let tok_b: HashSet<String> = tokens(b).into_iter().collect();
    if tok_a.is_empty() || tok_b.is_empty() {
        return 0.0;
    }
    let shared = tok_a.intersection(&tok_b).count();
    let union = tok_a.union(&tok_b).count();
    if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

/// Jaccard overlap over bag-of-words (word length > 3), case-insensitive,
/// used for bio comparison (spec §4.4 bio factor).
pub fn bag_of_words_jaccard(a: &str, b: &str) -> f64 {
    let words = |s: &str| -> HashSet<String> {
        s.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 3)
            .map(str::to_string)
            .collect()
    };
    let wa = words(a);
    let wb = words(b);
    if wa.is_empty() || wb.is_empty() {
        return 0.0;
    }
    let shared = wa.intersection(&wb).count();
    let union = wa.union(&wb).count();
    if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_strings_yield_zero() {
        assert_eq!(similarity("", "anything"), 0.0);
        assert_eq!(similarity("anything", ""), 0.0);
    }

    #[test]
    fn identical_strings_yield_one() {
        assert_eq!(similarity("Zenobia Quark", "zenobia quark"), 1.0);
    }

    #[test]
    fn close_names_score_high() {
        assert!(similarity("Jonathan Smith", "Jonathon Smith") > 0.85);
    }

    #[test]
    fn nickname_subset_matches() {
        assert!(names_likely_match("Bob Jones", "Robert Bob Jones"));
    }

    #[test]
    fn initials_match_without_dice() {
        assert!(names_likely_match("J. Q. Public", "Jane Quinn Public"));
    }

    #[test]
    fn unrelated_names_do_not_match() {
        assert!(!names_likely_match("Zenobia Quark", "Harold Finch"));
    }

    #[test]
    fn business_suffix_normalization() {
        assert_eq!(normalize_business_name("Acme Corp"), "acme");
        assert_eq!(normalize_business_name("acme.com"), "acme");
        assert_eq!(normalize_business_name("Acme, LLC"), "acme");
    }

    #[test]
    fn bio_jaccard_ignores_short_words() {
        let score = bag_of_words_jaccard("I love building scalable systems", "I enjoy building scalable things");
        assert!(score > 0.0 && score < 1.0);
    }
}
