use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::core::AppState;
use crate::crawler::tokenizer::is_stopword;
use crate::spellcheck::engine::{
    apply_case, choose_correction, normalize_word, LexiconEntry, MAX_EDIT_DISTANCE,
};
use crate::storage::lexicon;

/// Dictionary-shaped words; anything shorter, longer or non-alphabetic is
/// never corrected.
pub static WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[a-zA-Z]{2,32}\b").expect("word regex"));

/// Words at or above this popularity are trusted as correctly spelled.
const SUSPECT_MAX_POPULARITY: f64 = 3.0;

fn extract_words(query: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for m in WORD_RE.find_iter(query) {
        let word = normalize_word(m.as_str());
        if is_stopword(&word) || !seen.insert(word.clone()) {
            continue;
        }
        words.push(word);
    }
    words
}

async fn lookup_entry(state: &AppState, word: &str) -> Option<LexiconEntry> {
    if let Some(entry) = state.spell_meta.lookup(word).await {
        return Some(entry);
    }
    let lookup = vec![word.to_string()];
    match lexicon::lookup_entries(&state.db, &lookup).await {
        Ok(mut entries) => entries.pop(),
        Err(err) => {
            warn!(word, %err, "lexicon lookup failed");
            None
        }
    }
}

/// Suggest a single-edit rewrite of `query`, or `None` when every word is
/// known and popular enough, or no candidate clears the correction policy.
/// The response is `None` on any ambiguity — a bad suggestion is worse than
/// no suggestion.
pub async fn suggest(state: &AppState, query: &str) -> anyhow::Result<Option<String>> {
    let words = extract_words(query);
    if words.is_empty() {
        return Ok(None);
    }

    let mut corrections: HashMap<String, String> = HashMap::new();
    for word in &words {
        let known = lookup_entry(state, word).await;
        let suspect = known
            .as_ref()
            .map(|entry| entry.popularity_score < SUSPECT_MAX_POPULARITY)
            .unwrap_or(true);
        if !suspect {
            continue;
        }

        let len = word.chars().count() as i64;
        let candidates =
            lexicon::candidates_for(&state.db, word, (len - 2).max(2), len + 2).await?;
        if let Some(replacement) =
            choose_correction(word, known.as_ref(), &candidates, MAX_EDIT_DISTANCE)
        {
            corrections.insert(word.clone(), replacement);
        }
    }

    if corrections.is_empty() {
        return Ok(None);
    }

    Ok(Some(rewrite_query(query, &corrections)))
}

/// Apply corrections to the original string, word match by word match,
/// keeping each match's casing style.
fn rewrite_query(query: &str, corrections: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(query.len());
    let mut last_end = 0;
    for m in WORD_RE.find_iter(query) {
        out.push_str(&query[last_end..m.start()]);
        let original = m.as_str();
        match corrections.get(&normalize_word(original)) {
            Some(replacement) => out.push_str(&apply_case(original, replacement)),
            None => out.push_str(original),
        }
        last_end = m.end();
    }
    out.push_str(&query[last_end..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_words_drops_stopwords_and_duplicates() {
        assert_eq!(
            extract_words("The Cloudfare status STATUS page"),
            vec!["cloudfare".to_string(), "status".to_string(), "page".to_string()]
        );
        assert!(extract_words("the and of").is_empty());
        assert!(extract_words("x 123 !!").is_empty());
    }

    #[test]
    fn rewrite_preserves_casing_and_punctuation() {
        let mut corrections = HashMap::new();
        corrections.insert("cloudfare".to_string(), "cloudflare".to_string());
        assert_eq!(
            rewrite_query("Cloudfare status?", &corrections),
            "Cloudflare status?"
        );
        assert_eq!(
            rewrite_query("CLOUDFARE down, cloudfare up", &corrections),
            "CLOUDFLARE down, cloudflare up"
        );
    }

    #[test]
    fn rewrite_leaves_unknown_words_alone() {
        let corrections = HashMap::new();
        assert_eq!(rewrite_query("qwen chat", &corrections), "qwen chat");
    }
}
