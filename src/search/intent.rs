use once_cell::sync::Lazy;
use regex::Regex;

use crate::crawler::tokenizer::{is_stopword, tokenize, TOKEN_RE};

const CANDIDATE_BUFFER: usize = 200;
const MAX_CANDIDATES: usize = 2000;

static NON_ALNUM_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("non-alnum regex"));

/// Runs of non-alphanumerics become single spaces; the result is what
/// "the query appears in this title" is judged against.
pub fn normalize_text(text: &str) -> String {
    NON_ALNUM_RUN_RE
        .replace_all(&text.to_lowercase(), " ")
        .trim()
        .to_string()
}

fn compact_text(text: &str) -> String {
    NON_ALNUM_RUN_RE.replace_all(&text.to_lowercase(), "").into_owned()
}

/// Distinct non-stopword word tokens of the query, in order of first
/// appearance. Unstemmed: these feed the literal title/url hit counting.
pub fn extract_query_words(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut words = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for m in TOKEN_RE.find_iter(&lowered) {
        let term = m.as_str();
        if is_stopword(term) || !seen.insert(term.to_string()) {
            continue;
        }
        words.push(term.to_string());
    }
    words
}

fn count_hits(text: &str, query_words: &[String]) -> usize {
    if query_words.is_empty() {
        return 0;
    }
    let lowered = text.to_lowercase();
    let word_set: std::collections::HashSet<&str> =
        TOKEN_RE.find_iter(&lowered).map(|m| m.as_str()).collect();
    query_words
        .iter()
        .filter(|w| word_set.contains(w.as_str()))
        .count()
}

fn compact_word_hits(compact_text: &str, query_words: &[String]) -> usize {
    if compact_text.is_empty() {
        return 0;
    }
    query_words
        .iter()
        .filter(|w| compact_text.contains(w.as_str()))
        .count()
}

/// Everything derived from the query string once, shared by candidate
/// retrieval and per-candidate scoring.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub query_terms: Vec<String>,
    pub query_words: Vec<String>,
    pub query_phrase: String,
    pub query_compact: String,
    pub total_terms: usize,
    pub candidate_limit: i64,
}

impl QueryContext {
    /// `None` when every token is stopworded away — the caller returns the
    /// empty envelope without touching the store.
    pub fn build(q: &str, limit: usize, offset: usize) -> Option<Self> {
        let query_terms: Vec<String> = tokenize(q).into_keys().collect();
        if query_terms.is_empty() {
            return None;
        }
        let query_words = extract_query_words(q);
        let candidate_limit = MAX_CANDIDATES.min((offset + limit + CANDIDATE_BUFFER).max(limit * 10));
        Some(Self {
            query_phrase: normalize_text(q),
            query_compact: query_words.concat(),
            total_terms: query_terms.len(),
            candidate_limit: candidate_limit as i64,
            query_terms,
            query_words,
        })
    }

    /// The lexical part alone: damped token score plus term coverage. Used
    /// on its own for degraded results where no text columns are available.
    pub fn base_score(&self, token_score: f64, matched_terms: i64) -> f64 {
        let mut score = token_score.max(0.0).ln_1p() * 12.0;
        if self.total_terms > 0 {
            let coverage = matched_terms as f64 / self.total_terms as f64;
            score += coverage * 25.0;
            if matched_terms as usize == self.total_terms {
                score += 40.0;
            }
        }
        score
    }

    /// The full ranking function: the damped lexical base plus rule-based
    /// phrase, URL and coverage bonuses. Holding everything else fixed, a
    /// higher token score never lowers the result.
    pub fn intent_score(
        &self,
        token_score: f64,
        matched_terms: i64,
        title: &str,
        description: &str,
        url: &str,
    ) -> f64 {
        let mut score = self.base_score(token_score, matched_terms);

        let normalized_title = normalize_text(title);
        let normalized_description = normalize_text(description);
        let normalized_url = normalize_text(url);
        let compact_url = compact_text(url);

        if !self.query_phrase.is_empty() {
            if normalized_title.contains(&self.query_phrase) {
                score += 140.0;
            }
            if normalized_url.contains(&self.query_phrase) {
                score += 70.0;
            }
            if normalized_description.contains(&self.query_phrase) {
                score += 25.0;
            }
        }
        if !self.query_compact.is_empty() && compact_url.contains(&self.query_compact) {
            score += 90.0;
        }

        let title_hits = count_hits(title, &self.query_words);
        let url_hits = count_hits(url, &self.query_words);
        let compact_url_hits = compact_word_hits(&compact_url, &self.query_words);
        score += title_hits as f64 * 22.0;
        score += url_hits as f64 * 16.0;
        score += compact_url_hits as f64 * 12.0;

        if !self.query_words.is_empty() {
            if title_hits == self.query_words.len() {
                score += 80.0;
            }
            if url_hits == self.query_words.len() {
                score += 55.0;
            }
            if compact_url_hits == self.query_words.len() {
                score += 45.0;
            }
        }

        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_flattens_punctuation() {
        assert_eq!(normalize_text("Qwen: Chat!"), "qwen chat");
        assert_eq!(normalize_text("  --  "), "");
    }

    #[test]
    fn query_words_keep_first_appearance_order() {
        assert_eq!(
            extract_query_words("Chat the qwen chat"),
            vec!["chat".to_string(), "qwen".to_string()]
        );
    }

    #[test]
    fn stopworded_query_builds_no_context() {
        assert!(QueryContext::build("the and", 20, 0).is_none());
        assert!(QueryContext::build("qwen chat", 20, 0).is_some());
    }

    #[test]
    fn candidate_limit_is_clamped() {
        let small = QueryContext::build("qwen chat", 20, 0).unwrap();
        assert_eq!(small.candidate_limit, 220);
        let deep = QueryContext::build("qwen chat", 100, 5000).unwrap();
        assert_eq!(deep.candidate_limit, 2000);
    }

    #[test]
    fn exact_title_phrase_beats_raw_token_score() {
        let ctx = QueryContext::build("qwen chat", 20, 0).unwrap();
        let direct = ctx.intent_score(28.0, 2, "Qwen Chat", "Official chat client", "https://chat.qwen.ai/");
        let generic = ctx.intent_score(
            180.0,
            2,
            "AI model update",
            "News about Qwen",
            "https://huggingface.co/blog/qwen-models",
        );
        assert!(direct > generic);
    }

    #[test]
    fn compact_domain_match_beats_raw_token_score() {
        let ctx = QueryContext::build("cloudflare status", 20, 0).unwrap();
        let status_page = ctx.intent_score(
            25.0,
            2,
            "System Status",
            "Current status and incidents",
            "https://www.cloudflarestatus.com/",
        );
        let generic_blog = ctx.intent_score(
            160.0,
            2,
            "Cloudflare engineering update",
            "Some maintenance notes",
            "https://blog.cloudflare.com/maintenance",
        );
        assert!(status_page > generic_blog);
    }

    #[test]
    fn intent_score_is_monotone_in_token_score() {
        let ctx = QueryContext::build("qwen chat", 20, 0).unwrap();
        let mut last = f64::MIN;
        for token_score in [0.0, 1.0, 10.0, 100.0, 1000.0] {
            let score = ctx.intent_score(token_score, 2, "Qwen Chat", "desc", "https://example.com/");
            assert!(score >= last);
            last = score;
        }
    }
}
