use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};

/// Word-shaped tokens: two or more lowercase alphanumerics.
pub static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]{2,}").expect("token regex"));

static STEMMER: Lazy<Stemmer> = Lazy::new(|| Stemmer::create(Algorithm::English));

/// Fixed English stopword list. Filtered before stemming so query and
/// document pipelines agree on what survives.
pub static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
        "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his",
        "himself", "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself",
        "they", "them", "their", "theirs", "themselves", "what", "which", "who", "whom", "this",
        "that", "that'll", "these", "those", "am", "is", "are", "was", "were", "be", "been",
        "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an", "the",
        "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by", "for",
        "with", "about", "against", "between", "into", "through", "during", "before", "after",
        "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over", "under",
        "again", "further", "then", "once", "here", "there", "when", "where", "why", "how",
        "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no",
        "nor", "not", "only", "own", "same", "so", "than", "too", "very", "s", "t", "can",
        "will", "just", "don", "don't", "should", "should've", "now", "d", "ll", "m", "o", "re",
        "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn", "didn't", "doesn",
        "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn", "isn't", "ma",
        "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan", "shan't",
        "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't", "wouldn",
        "wouldn't",
    ]
    .into_iter()
    .collect()
});

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(word)
}

/// Tokenize text into stemmed term frequencies: lowercase, split on the word
/// regex, drop stopwords, stem, count. Queries and documents both go through
/// here so stems align corpus-wide.
pub fn tokenize(text: &str) -> HashMap<String, i32> {
    let lowered = text.to_lowercase();
    let mut counts: HashMap<String, i32> = HashMap::new();
    for m in TOKEN_RE.find_iter(&lowered) {
        let token = m.as_str();
        if is_stopword(token) {
            continue;
        }
        let stemmed = STEMMER.stem(token).into_owned();
        *counts.entry(stemmed).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_stopwords_and_short_tokens() {
        let counts = tokenize("The cat and the hat, a x");
        assert!(counts.contains_key("cat"));
        assert!(counts.contains_key("hat"));
        assert!(!counts.contains_key("the"));
        assert!(!counts.contains_key("and"));
        // single-character tokens never match the word regex
        assert!(!counts.contains_key("a"));
        assert!(!counts.contains_key("x"));
    }

    #[test]
    fn stems_inflected_forms_together() {
        let counts = tokenize("running runs run");
        assert_eq!(counts.len(), 1);
        assert_eq!(counts.values().sum::<i32>(), 3);
    }

    #[test]
    fn counts_repeated_terms() {
        let counts = tokenize("search search searching");
        assert_eq!(counts.get("search"), Some(&3));
    }

    #[test]
    fn query_and_document_tokens_align() {
        let doc = tokenize("Qwen releases a new chat model");
        let query = tokenize("qwen chat");
        for term in query.keys() {
            assert!(doc.contains_key(term), "query term {term} missing from doc tokens");
        }
    }

    #[test]
    fn keeps_numeric_tokens() {
        let counts = tokenize("error 404 page");
        assert!(counts.contains_key("404"));
    }
}
