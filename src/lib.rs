pub mod batch;
pub mod core;
pub mod crawler;
pub mod db;
pub mod search;
pub mod spellcheck;
pub mod storage;

// --- Primary core exports ---
pub use self::core::config::Settings;
pub use self::core::types;
pub use self::core::AppState;
