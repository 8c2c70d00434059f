//! Approximate string scoring on a 0-100 scale.

use std::collections::BTreeSet;

/// Edit-distance similarity of two strings, 0-100.
pub fn ratio(a: &str, b: &str) -> u8 {
    let score = strsim::normalized_levenshtein(a, b) * 100.0;
    score.round().clamp(0.0, 100.0) as u8
}

/// Order-insensitive similarity of the word sets of two strings, 0-100.
///
/// Both inputs are lowercased and every non-alphanumeric character becomes a
/// word break. The shared words are compared against each side's shared words
/// plus its leftovers, and the best pairing wins. An input with no words
/// scores 0.
pub fn token_set_ratio(a: &str, b: &str) -> u8 {
    let tokens_a = tokens(a);
    let tokens_b = tokens(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0;
    }

    let shared = words(tokens_a.intersection(&tokens_b));
    let only_a = words(tokens_a.difference(&tokens_b));
    let only_b = words(tokens_b.difference(&tokens_a));

    let with_a = join_words(&shared, &only_a);
    let with_b = join_words(&shared, &only_b);

    ratio(&shared, &with_a)
        .max(ratio(&shared, &with_b))
        .max(ratio(&with_a, &with_b))
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn words<'a>(tokens: impl Iterator<Item = &'a String>) -> String {
    tokens.map(String::as_str).collect::<Vec<_>>().join(" ")
}

fn join_words(head: &str, tail: &str) -> String {
    format!("{head} {tail}").trim().to_string()
}
