use serde::{Deserialize, Serialize};

pub const MAX_EDIT_DISTANCE: u32 = 2;

/// A dictionary word with its frequency signals. Served from the meta-file
/// cache when possible, otherwise from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LexiconEntry {
    pub word: String,
    pub doc_frequency: i64,
    pub total_frequency: i64,
    pub external_frequency: i64,
    pub popularity_score: f64,
}

pub fn normalize_word(word: &str) -> String {
    word.trim().to_lowercase()
}

/// `ln(1+doc)·4 + ln(1+total)·2 + ln(1+ext)·3` — the single popularity
/// formula shared by the lexicon builder and the correction policy.
pub fn popularity_score(doc_frequency: i64, total_frequency: i64, external_frequency: i64) -> f64 {
    (doc_frequency.max(0) as f64).ln_1p() * 4.0
        + (total_frequency.max(0) as f64).ln_1p() * 2.0
        + (external_frequency.max(0) as f64).ln_1p() * 3.0
}

/// Optimal string alignment distance: Levenshtein plus a single-transposition
/// rule. Returns `None` once the distance provably exceeds `max_distance`;
/// rows whose minimum passes the cap short-circuit the whole computation.
pub fn osa_distance(source: &str, target: &str, max_distance: u32) -> Option<u32> {
    let source = normalize_word(source);
    let target = normalize_word(target);

    if source == target {
        return Some(0);
    }
    let s: Vec<char> = source.chars().collect();
    let t: Vec<char> = target.chars().collect();
    if s.is_empty() || t.is_empty() {
        let distance = s.len().max(t.len()) as u32;
        return (distance <= max_distance).then_some(distance);
    }
    if s.len().abs_diff(t.len()) as u32 > max_distance {
        return None;
    }

    let rows = s.len() + 1;
    let cols = t.len() + 1;
    let mut dp = vec![vec![0u32; cols]; rows];
    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i as u32;
    }
    for j in 0..cols {
        dp[0][j] = j as u32;
    }

    for i in 1..rows {
        let mut row_min = max_distance + 1;
        for j in 1..cols {
            let cost = u32::from(s[i - 1] != t[j - 1]);
            let mut value = (dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1)
                .min(dp[i - 1][j - 1] + cost);

            if i > 1 && j > 1 && s[i - 1] == t[j - 2] && s[i - 2] == t[j - 1] {
                value = value.min(dp[i - 2][j - 2] + 1);
            }

            dp[i][j] = value;
            row_min = row_min.min(value);
        }
        if row_min > max_distance {
            return None;
        }
    }

    let distance = dp[rows - 1][cols - 1];
    (distance <= max_distance).then_some(distance)
}

fn better_ranked(
    (distance_a, a): (u32, &LexiconEntry),
    (distance_b, b): (u32, &LexiconEntry),
) -> bool {
    if distance_a != distance_b {
        return distance_a < distance_b;
    }
    if a.popularity_score != b.popularity_score {
        return a.popularity_score > b.popularity_score;
    }
    if a.doc_frequency != b.doc_frequency {
        return a.doc_frequency > b.doc_frequency;
    }
    if a.total_frequency != b.total_frequency {
        return a.total_frequency > b.total_frequency;
    }
    a.word < b.word
}

/// Pick the best correction for `word`, or `None` when no candidate clears
/// the acceptance bar. Deterministic in its inputs: candidates are ranked by
/// (distance, popularity, doc freq, total freq, word), and a correction for
/// a word the lexicon already knows must beat it by a wide popularity margin.
pub fn choose_correction(
    word: &str,
    known: Option<&LexiconEntry>,
    candidates: &[LexiconEntry],
    max_distance: u32,
) -> Option<String> {
    let normalized = normalize_word(word);
    if normalized.is_empty() {
        return None;
    }

    let known_popularity = known.map(|k| k.popularity_score).unwrap_or(0.0);

    let mut best: Option<(u32, &LexiconEntry)> = None;
    for candidate in candidates {
        if candidate.word == normalized {
            continue;
        }
        let Some(distance) = osa_distance(&normalized, &candidate.word, max_distance) else {
            continue;
        };
        if normalized.chars().count() <= 3 && distance > 1 {
            continue;
        }
        let ranked = (distance, candidate);
        if best.is_none_or(|current| better_ranked(ranked, current)) {
            best = Some(ranked);
        }
    }

    let (distance, best) = best?;

    if known_popularity > 0.0 {
        let required_multiplier = if distance == 1 { 1.8 } else { 4.0 };
        if best.popularity_score < known_popularity * required_multiplier {
            return None;
        }
    } else {
        let minimum = if distance == 1 { 0.5 } else { 2.5 };
        if best.popularity_score < minimum {
            return None;
        }
    }

    Some(best.word.clone())
}

/// Rewrite `replacement` in the casing style of `original`: ALL-UPPER input
/// gets an uppercase replacement, Capitalized input a capitalized one,
/// anything else is passed through unchanged.
pub fn apply_case(original: &str, replacement: &str) -> String {
    let alphabetic: Vec<char> = original.chars().filter(|c| c.is_alphabetic()).collect();
    if !alphabetic.is_empty() && alphabetic.iter().all(|c| c.is_uppercase()) {
        return replacement.to_uppercase();
    }

    let mut chars = original.chars();
    let first_upper = chars.next().is_some_and(|c| c.is_uppercase());
    let rest_lower = chars.all(|c| !c.is_uppercase());
    if first_upper && rest_lower {
        let mut out = String::with_capacity(replacement.len());
        let mut rep = replacement.chars();
        if let Some(first) = rep.next() {
            out.extend(first.to_uppercase());
        }
        out.extend(rep.flat_map(|c| c.to_lowercase()));
        return out;
    }

    replacement.to_string()
}
