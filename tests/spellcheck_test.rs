//! Spell-checker acceptance scenarios: OSA distances, correction policy,
//! and casing preservation.

use scour::spellcheck::engine::{
    apply_case, choose_correction, osa_distance, LexiconEntry, MAX_EDIT_DISTANCE,
};

fn entry(word: &str, doc: i64, total: i64, ext: i64, pop: f64) -> LexiconEntry {
    LexiconEntry {
        word: word.to_string(),
        doc_frequency: doc,
        total_frequency: total,
        external_frequency: ext,
        popularity_score: pop,
    }
}

#[test]
fn osa_distances_match_expected_edits() {
    assert_eq!(osa_distance("cloudfare", "cloudflare", MAX_EDIT_DISTANCE), Some(1));
    assert_eq!(osa_distance("cluodflare", "cloudflare", MAX_EDIT_DISTANCE), Some(1));
    assert_eq!(osa_distance("qwen", "qwent", MAX_EDIT_DISTANCE), Some(1));
    assert_eq!(osa_distance("qwen", "qwen", MAX_EDIT_DISTANCE), Some(0));
    assert_eq!(osa_distance("qwen", "elephant", MAX_EDIT_DISTANCE), None);
}

#[test]
fn unknown_word_accepts_the_popular_neighbor() {
    let best = choose_correction(
        "cloudfare",
        None,
        &[
            entry("cloudflare", 200, 1200, 40, 26.0),
            entry("cloudware", 4, 25, 2, 7.0),
        ],
        MAX_EDIT_DISTANCE,
    );
    assert_eq!(best.as_deref(), Some("cloudflare"));
}

#[test]
fn popular_known_word_is_left_alone() {
    let known = entry("status", 80, 1000, 30, 18.0);
    let best = choose_correction(
        "status",
        Some(&known),
        &[entry("statues", 15, 80, 2, 8.0), entry("states", 25, 120, 3, 10.0)],
        MAX_EDIT_DISTANCE,
    );
    assert_eq!(best, None);
}

#[test]
fn weakly_known_word_needs_a_big_margin() {
    // distance 1 needs 1.8x the known popularity; 2.0 * 1.8 = 3.6
    let known = entry("serch", 1, 3, 0, 2.0);
    let below_margin = choose_correction(
        "serch",
        Some(&known),
        &[entry("sorch", 2, 5, 0, 3.0)],
        MAX_EDIT_DISTANCE,
    );
    assert_eq!(below_margin, None);

    let above_margin = choose_correction(
        "serch",
        Some(&known),
        &[entry("search", 500, 4000, 90, 30.0)],
        MAX_EDIT_DISTANCE,
    );
    assert_eq!(above_margin.as_deref(), Some("search"));
}

#[test]
fn casing_of_the_input_survives_the_correction() {
    assert_eq!(apply_case("Cloudfare", "cloudflare"), "Cloudflare");
    assert_eq!(apply_case("CLOUDFARE", "cloudflare"), "CLOUDFLARE");
    assert_eq!(apply_case("cloudfare", "cloudflare"), "cloudflare");
    assert_eq!(apply_case("cLoudFare", "cloudflare"), "cloudflare");
}
