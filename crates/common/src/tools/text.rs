//! Word-level helpers shared by the text tools

use std::collections::HashMap;

/// Common English words ignored by keyword scoring
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "day", "get", "has", "him", "his", "how", "man", "new", "now", "old", "see",
    "two", "way", "who", "boy", "did", "its", "let", "put", "say", "she", "too", "use", "that",
    "with", "have", "this", "will", "your", "from", "they", "know", "want", "been", "good",
    "much", "some", "time", "very", "when", "come", "here", "just", "like", "long", "make",
    "many", "over", "such", "take", "than", "them", "well", "were", "what", "where", "which",
    "while", "would", "there", "could", "other", "after", "first", "never", "these", "think",
    "being", "every", "great", "might", "shall", "still", "those", "under", "into", "about",
    "also", "more", "most", "only", "then", "their", "does", "each", "both", "any", "may",
    "should", "because", "between", "through", "during", "before", "same", "own", "why",
    "is", "a", "an", "of", "to", "in", "on", "at", "by", "it", "as", "or", "be", "if", "so",
    "do", "we", "me", "my", "no", "up", "us", "am", "he", "i",
];

pub(crate) fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Lowercased alphanumeric terms, stopwords removed
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !is_stopword(w))
        .collect()
}

/// The `n` most frequent alphabetic words longer than three characters.
/// Ties keep first-seen order.
pub(crate) fn top_keywords(text: &str, n: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();

    let words = text
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| w.chars().count() > 3)
        .map(str::to_lowercase)
        .filter(|w| !is_stopword(w));

    for (position, word) in words.enumerate() {
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked
        .into_iter()
        .take(n)
        .map(|(word, (count, _))| (word, count))
        .collect()
}

/// First `max` characters of `text`, cut on a char boundary
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
