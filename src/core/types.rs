use serde::{Deserialize, Serialize};

// Token field constants shared by writers and the query layer.
pub const FIELD_TITLE: i16 = 1;
pub const FIELD_DESCRIPTION: i16 = 2;
pub const FIELD_BODY: i16 = 4;

// Token source constants.
pub const SOURCE_WEB: i16 = 1;
pub const SOURCE_NEWS: i16 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchItem {
    pub title: String,
    pub description: String,
    pub url: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedInfo {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsSearchItem {
    pub title: String,
    pub description: String,
    pub url: String,
    pub score: f64,
    pub feed: Option<FeedInfo>,
    pub author: Option<String>,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    pub web: Vec<WebSearchItem>,
    pub news: Vec<NewsSearchItem>,
}

/// The `/search` envelope. Always well-formed: an unmatched or fully
/// stopworded query yields empty lists and count 0, not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: SearchResults,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellcheckResponse {
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
