use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::spellcheck::engine::LexiconEntry;

/// On-disk shape of the meta file the lexicon builder writes: the top words
/// by popularity, enough to answer most lookups without touching the store.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SpellMetaFile {
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub words: Vec<LexiconEntry>,
}

#[derive(Default)]
struct CacheState {
    mtime: Option<SystemTime>,
    words: HashMap<String, LexiconEntry>,
}

/// Read-mostly in-memory view of the spellcheck meta file. Reloaded whenever
/// the file's mtime changes (the batch runner rewrites it each cycle); a
/// missing or unparsable file just means every lookup misses.
pub struct SpellMetaCache {
    path: PathBuf,
    state: RwLock<CacheState>,
}

impl SpellMetaCache {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: RwLock::new(CacheState::default()),
        }
    }

    pub async fn lookup(&self, word: &str) -> Option<LexiconEntry> {
        self.refresh_if_stale().await;
        self.state.read().await.words.get(word).cloned()
    }

    async fn refresh_if_stale(&self) {
        let current_mtime = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok();

        {
            let state = self.state.read().await;
            if state.mtime == current_mtime {
                return;
            }
        }

        let mut state = self.state.write().await;
        if state.mtime == current_mtime {
            return;
        }

        state.words = match std::fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<SpellMetaFile>(&contents) {
                Ok(meta) => {
                    info!(
                        path = %self.path.display(),
                        words = meta.words.len(),
                        "loaded spellcheck meta file"
                    );
                    meta.words
                        .into_iter()
                        .map(|entry| (entry.word.clone(), entry))
                        .collect()
                }
                Err(err) => {
                    warn!(path = %self.path.display(), %err, "spellcheck meta file parse error");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        state.mtime = current_mtime;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_meta(path: &std::path::Path, words: &[(&str, f64)]) {
        let meta = SpellMetaFile {
            generated_at: "2026-02-21T00:00:00Z".to_string(),
            words: words
                .iter()
                .map(|(word, pop)| LexiconEntry {
                    word: word.to_string(),
                    doc_frequency: 10,
                    total_frequency: 25,
                    external_frequency: 5,
                    popularity_score: *pop,
                })
                .collect(),
        };
        std::fs::write(path, serde_json::to_string(&meta).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn loads_entries_from_meta_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spellcheck_meta.json");
        write_meta(&path, &[("search", 7.5)]);

        let cache = SpellMetaCache::new(path);
        let entry = cache.lookup("search").await.unwrap();
        assert_eq!(entry.popularity_score, 7.5);
        assert!(cache.lookup("absent").await.is_none());
    }

    #[tokio::test]
    async fn missing_file_yields_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SpellMetaCache::new(dir.path().join("nope.json"));
        assert!(cache.lookup("anything").await.is_none());
    }

    #[tokio::test]
    async fn reloads_when_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spellcheck_meta.json");
        write_meta(&path, &[("first", 1.0)]);

        let cache = SpellMetaCache::new(path.clone());
        assert!(cache.lookup("first").await.is_some());
        assert!(cache.lookup("second").await.is_none());

        // Rewrites bump the mtime; make sure it moves even on coarse clocks.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        write_meta(&path, &[("second", 2.0)]);
        let now = std::time::SystemTime::now();
        let _ = std::fs::File::options()
            .append(true)
            .open(&path)
            .and_then(|f| f.set_modified(now));

        assert!(cache.lookup("second").await.is_some());
    }
}
