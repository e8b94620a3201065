use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::core::AppState;
use crate::spellcheck::engine::{normalize_word, popularity_score, LexiconEntry};
use crate::spellcheck::meta::SpellMetaFile;
use crate::storage::lexicon::{
    corpus_word_totals, refresh_words, sync_lexicon, token_term_stats, LexiconRow,
};

const EXTERNAL_REQUEST_TIMEOUT_S: u64 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SourceMode {
    /// Lines of `word count`.
    Counted,
    /// One word per line, ordered by rank.
    Ranked,
}

struct ExternalSource {
    name: &'static str,
    url: &'static str,
    mode: SourceMode,
    limit: usize,
    weight: f64,
}

/// Two public word-frequency lists. Both are optional: the build completes
/// on corpus signals alone when they are unreachable.
const EXTERNAL_SOURCES: [ExternalSource; 2] = [
    ExternalSource {
        name: "frequencywords-50k",
        url: "https://raw.githubusercontent.com/hermitdave/FrequencyWords/master/content/2018/en/en_50k.txt",
        mode: SourceMode::Counted,
        limit: 50_000,
        weight: 1.0,
    },
    ExternalSource {
        name: "google-20k",
        url: "https://raw.githubusercontent.com/first20hours/google-10000-english/master/20k.txt",
        mode: SourceMode::Ranked,
        limit: 20_000,
        weight: 1.0,
    },
];

fn is_dictionary_word(word: &str) -> bool {
    let len = word.chars().count();
    (2..=32).contains(&len) && word.chars().all(|c| c.is_ascii_alphabetic())
}

fn parse_counted_line(line: &str) -> Option<(String, u64)> {
    let mut parts = line.split_whitespace();
    let word = normalize_word(parts.next()?);
    if !is_dictionary_word(&word) {
        return None;
    }
    let count: u64 = parts.next()?.replace(',', "").parse().ok()?;
    Some((word, count))
}

fn score_counted(count: u64, weight: f64) -> i64 {
    ((count as f64).ln_1p() * 6.0 * weight).floor() as i64
}

fn score_ranked(rank: usize, limit: usize, weight: f64) -> i64 {
    let remaining = limit.saturating_sub(rank).saturating_add(1).max(1);
    ((remaining as f64).ln_1p() * 5.0 * weight).floor() as i64
}

async fn collect_external(state: &AppState) -> HashMap<String, i64> {
    let mut external: HashMap<String, i64> = HashMap::new();

    for source in &EXTERNAL_SOURCES {
        let fetched = state
            .http_client
            .get(source.url)
            .timeout(Duration::from_secs(EXTERNAL_REQUEST_TIMEOUT_S))
            .send()
            .await
            .and_then(|r| r.error_for_status());
        let body = match fetched {
            Ok(response) => match response.text().await {
                Ok(body) => body,
                Err(err) => {
                    warn!(source = source.name, %err, "failed to read external word list");
                    continue;
                }
            },
            Err(err) => {
                warn!(source = source.name, %err, "failed to load external word list");
                continue;
            }
        };

        let mut loaded = 0usize;
        for (rank, line) in body.lines().enumerate() {
            if loaded >= source.limit {
                break;
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (word, score) = match source.mode {
                SourceMode::Counted => {
                    let Some((word, count)) = parse_counted_line(line) else {
                        continue;
                    };
                    (word, score_counted(count, source.weight))
                }
                SourceMode::Ranked => {
                    let word =
                        normalize_word(line.split_whitespace().next().unwrap_or_default());
                    if !is_dictionary_word(&word) {
                        continue;
                    }
                    (word, score_ranked(rank + 1, source.limit, source.weight))
                }
            };

            if score <= 0 {
                continue;
            }
            *external.entry(word).or_insert(0) += score;
            loaded += 1;
        }
        info!(source = source.name, loaded, "loaded external words");
    }

    external
}

fn write_meta_file(path: &Path, max_words: usize, rows: &[LexiconRow]) -> Result<()> {
    let meta = SpellMetaFile {
        generated_at: Utc::now().to_rfc3339(),
        words: rows
            .iter()
            .take(max_words)
            .map(|row| LexiconEntry {
                word: row.word.clone(),
                doc_frequency: row.doc_frequency,
                total_frequency: row.total_frequency,
                external_frequency: row.external_frequency,
                popularity_score: row.popularity_score,
            })
            .collect(),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string(&meta)?)?;
    Ok(())
}

/// Rebuild the spellcheck lexicon: external lists + corpus word counts +
/// token document frequencies, scored and merged into the dictionary. The
/// top slice lands in the meta file for in-memory lookups.
pub async fn run(state: &AppState) -> Result<()> {
    let external = collect_external(state).await;

    refresh_words(&state.db).await?;
    let corpus_totals = corpus_word_totals(&state.db).await?;
    let token_stats = token_term_stats(&state.db).await?;

    let mut doc_frequency: HashMap<String, i64> = HashMap::new();
    let mut total_frequency: HashMap<String, i64> = HashMap::new();
    for stat in token_stats {
        let word = normalize_word(&stat.term);
        if !is_dictionary_word(&word) {
            continue;
        }
        *doc_frequency.entry(word).or_insert(0) += stat.doc_freq;
    }
    for (word, total) in corpus_totals {
        let word = normalize_word(&word);
        if !is_dictionary_word(&word) {
            continue;
        }
        *total_frequency.entry(word).or_insert(0) += total;
    }

    let all_words: HashSet<String> = doc_frequency
        .keys()
        .chain(total_frequency.keys())
        .chain(external.keys())
        .cloned()
        .collect();

    let mut rows: Vec<LexiconRow> = Vec::with_capacity(all_words.len());
    for word in all_words {
        let doc_freq = doc_frequency.get(&word).copied().unwrap_or(0);
        let total_freq = total_frequency.get(&word).copied().unwrap_or(0);
        let ext_freq = external.get(&word).copied().unwrap_or(0);
        if doc_freq == 0 && total_freq == 0 && ext_freq == 0 {
            continue;
        }
        let popularity = popularity_score(doc_freq, total_freq, ext_freq);
        rows.push(LexiconRow {
            word,
            doc_frequency: doc_freq,
            total_frequency: total_freq,
            external_frequency: ext_freq,
            popularity_score: popularity,
        });
    }

    if rows.is_empty() {
        warn!("lexicon rebuild skipped: no words collected");
        return Ok(());
    }

    rows.sort_by(|a, b| {
        b.popularity_score
            .partial_cmp(&a.popularity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.word.cmp(&b.word))
    });

    write_meta_file(
        &state.settings.spellcheck_meta_path,
        state.settings.spellcheck_meta_max_words,
        &rows,
    )?;

    let (changed, removed) = sync_lexicon(&state.db, &rows).await?;
    info!(
        source_words = rows.len(),
        changed_rows = changed,
        removed_rows = removed,
        "synced spellcheck lexicon"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counted_lines_parse_word_and_count() {
        assert_eq!(parse_counted_line("hello 1,234"), Some(("hello".to_string(), 1234)));
        assert_eq!(parse_counted_line("hello 42"), Some(("hello".to_string(), 42)));
        assert_eq!(parse_counted_line("x 10"), None);
        assert_eq!(parse_counted_line("123 10"), None);
        assert_eq!(parse_counted_line("word"), None);
        assert_eq!(parse_counted_line("word notanumber"), None);
    }

    #[test]
    fn counted_scores_grow_with_count() {
        let low = score_counted(10, 1.0);
        let high = score_counted(100_000, 1.0);
        assert!(high > low);
        assert_eq!(score_counted(10, 1.0), ((10f64).ln_1p() * 6.0).floor() as i64);
    }

    #[test]
    fn ranked_scores_favor_the_top_of_the_list() {
        let first = score_ranked(1, 20_000, 1.0);
        let last = score_ranked(20_000, 20_000, 1.0);
        assert!(first > last);
        assert!(last >= 0);
    }

    #[test]
    fn dictionary_word_filter_bounds_length_and_alphabet() {
        assert!(is_dictionary_word("ab"));
        assert!(is_dictionary_word(&"a".repeat(32)));
        assert!(!is_dictionary_word("a"));
        assert!(!is_dictionary_word(&"a".repeat(33)));
        assert!(!is_dictionary_word("nota1word"));
        assert!(!is_dictionary_word("naïve"));
    }
}
