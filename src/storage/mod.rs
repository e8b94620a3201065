//! The storage gateway: every statement against Postgres lives here, and all
//! multi-row mutations run inside scoped transactions that commit on success
//! and roll back on fault. Other components never touch SQL directly.

pub mod analytics;
pub mod documents;
pub mod lexicon;
pub mod news;
pub mod queue;
pub mod search;
