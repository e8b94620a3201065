use std::path::PathBuf;

use anyhow::{bail, Context, Result};

/// Node role for the periodic batch runner.
///
/// `Auto` resolves to coordinator when this is node 0 (or the only node);
/// explicit values override that.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchRole {
    Auto,
    Coordinator,
    Worker,
}

impl BatchRole {
    pub fn parse_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(BatchRole::Auto),
            "coordinator" => Some(BatchRole::Coordinator),
            "worker" => Some(BatchRole::Worker),
            _ => None,
        }
    }
}

/// Process configuration, loaded once at startup from the environment.
///
/// Required variables fail fast with a clear message; everything else has a
/// default. All binaries share this struct.
#[derive(Clone, Debug)]
pub struct Settings {
    pub user_agent: String,
    pub queue_batch_size: usize,
    pub crawler_concurrency: usize,
    pub request_timeout_s: u64,
    pub batch_interval_s: u64,
    pub batch_total_nodes: i32,
    pub batch_node_index: i32,
    pub batch_role: BatchRole,
    pub spellcheck_meta_path: PathBuf,
    pub spellcheck_meta_max_words: usize,
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required environment variable {key}"))
}

fn optional_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let user_agent = required("CRAWLER_USER_AGENT")?;
        let queue_batch_size = required("QUEUE_BATCH_SIZE")?
            .trim()
            .parse::<usize>()
            .context("QUEUE_BATCH_SIZE must be an integer")?;
        let request_timeout_s = required("REQUEST_TIMEOUT_S")?
            .trim()
            .parse::<u64>()
            .context("REQUEST_TIMEOUT_S must be an integer")?;

        let batch_role = match std::env::var("BATCH_ROLE") {
            Ok(v) => match BatchRole::parse_str(&v) {
                Some(role) => role,
                None => bail!("BATCH_ROLE must be one of auto, coordinator, worker"),
            },
            Err(_) => BatchRole::Auto,
        };

        Ok(Self {
            user_agent,
            queue_batch_size,
            crawler_concurrency: optional_parsed("CRAWLER_CONCURRENCY", 8).max(1),
            request_timeout_s,
            batch_interval_s: optional_parsed("BATCH_INTERVAL_S", 300),
            batch_total_nodes: optional_parsed("BATCH_TOTAL_NODES", 1).max(1),
            batch_node_index: optional_parsed("BATCH_NODE_INDEX", 0),
            batch_role,
            spellcheck_meta_path: PathBuf::from(
                std::env::var("SPELLCHECK_META_PATH")
                    .unwrap_or_else(|_| "/tmp/spellcheck_meta.json".to_string()),
            ),
            spellcheck_meta_max_words: optional_parsed("SPELLCHECK_META_MAX_WORDS", 120_000),
        })
    }

    /// Whether this node runs the coordinator-only batch jobs.
    pub fn runs_global_jobs(&self) -> bool {
        match self.batch_role {
            BatchRole::Coordinator => true,
            BatchRole::Worker => false,
            BatchRole::Auto => self.batch_total_nodes == 1 || self.batch_node_index == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with(role: BatchRole, total_nodes: i32, node_index: i32) -> Settings {
        Settings {
            user_agent: "test-agent/1.0".to_string(),
            queue_batch_size: 16,
            crawler_concurrency: 4,
            request_timeout_s: 10,
            batch_interval_s: 60,
            batch_total_nodes: total_nodes,
            batch_node_index: node_index,
            batch_role: role,
            spellcheck_meta_path: PathBuf::from("/tmp/spellcheck_meta.json"),
            spellcheck_meta_max_words: 120_000,
        }
    }

    #[test]
    fn global_jobs_default_single_node() {
        assert!(settings_with(BatchRole::Auto, 1, 0).runs_global_jobs());
    }

    #[test]
    fn global_jobs_auto_uses_node_zero() {
        assert!(settings_with(BatchRole::Auto, 3, 0).runs_global_jobs());
        assert!(!settings_with(BatchRole::Auto, 3, 1).runs_global_jobs());
    }

    #[test]
    fn global_jobs_honors_explicit_role() {
        assert!(!settings_with(BatchRole::Worker, 1, 0).runs_global_jobs());
        assert!(settings_with(BatchRole::Coordinator, 3, 2).runs_global_jobs());
    }

    #[test]
    fn batch_role_parses_known_values() {
        assert_eq!(BatchRole::parse_str("coordinator"), Some(BatchRole::Coordinator));
        assert_eq!(BatchRole::parse_str(" Worker "), Some(BatchRole::Worker));
        assert_eq!(BatchRole::parse_str("primary"), None);
    }
}
