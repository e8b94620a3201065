pub mod intent;

use std::cmp::Ordering;

use tracing::warn;

use crate::core::types::{
    FeedInfo, NewsSearchItem, SearchResponse, SearchResults, WebSearchItem,
};
use crate::core::AppState;
use crate::search::intent::QueryContext;
use crate::storage::search::{news_candidates, web_candidates, WebCandidates};

/// News items carry a small constant boost so a tie between a page and an
/// article about the same story resolves toward the article.
const NEWS_BONUS: f64 = 8.0;

fn sort_ranked_web(items: &mut [WebSearchItem]) {
    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.url.cmp(&b.url))
    });
}

fn sort_ranked_news(items: &mut [NewsSearchItem]) {
    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.url.cmp(&b.url))
    });
}

fn page<T: Clone>(items: &[T], offset: usize, limit: usize) -> Vec<T> {
    items.iter().skip(offset).take(limit).cloned().collect()
}

/// Run a query end to end: candidate retrieval for both sources, intent
/// ranking, then pagination. The envelope is always well-formed; a fully
/// stopworded query short-circuits to the empty shape.
pub async fn perform_search(
    state: &AppState,
    q: &str,
    limit: usize,
    offset: usize,
) -> anyhow::Result<SearchResponse> {
    let Some(ctx) = QueryContext::build(q, limit, offset) else {
        return Ok(SearchResponse::default());
    };

    let mut web_ranked: Vec<WebSearchItem> =
        match web_candidates(&state.db, &ctx.query_terms, ctx.candidate_limit).await? {
            WebCandidates::Full(rows) => rows
                .into_iter()
                .map(|row| {
                    let score = ctx.intent_score(
                        row.token_score.unwrap_or(0.0),
                        row.matched_terms.unwrap_or(0),
                        &row.title,
                        &row.description,
                        &row.url,
                    );
                    WebSearchItem {
                        title: row.title,
                        description: row.description,
                        url: row.url,
                        score,
                    }
                })
                .collect(),
            WebCandidates::Degraded(rows) => {
                // Legacy non-UTF-8 rows: no text columns survived the retry,
                // so rank on the damped lexical score alone.
                warn!("returning degraded web results after encoding fault");
                rows.into_iter()
                    .map(|row| WebSearchItem {
                        title: String::new(),
                        description: String::new(),
                        url: String::new(),
                        score: ctx.base_score(
                            row.token_score.unwrap_or(0.0),
                            row.matched_terms.unwrap_or(0),
                        ),
                    })
                    .collect()
            }
        };
    sort_ranked_web(&mut web_ranked);

    let mut news_ranked: Vec<NewsSearchItem> =
        news_candidates(&state.db, &ctx.query_terms, ctx.candidate_limit)
            .await?
            .into_iter()
            .map(|row| {
                let score = ctx.intent_score(
                    row.token_score.unwrap_or(0.0),
                    row.matched_terms.unwrap_or(0),
                    &row.title,
                    &row.description,
                    &row.url,
                ) + NEWS_BONUS;
                NewsSearchItem {
                    title: row.title,
                    description: row.description,
                    url: row.url,
                    score,
                    feed: row.feed_name.map(|name| FeedInfo { name: Some(name) }),
                    author: row.author,
                    published_at: row.published_at.map(|ts| ts.to_rfc3339()),
                }
            })
            .collect();
    sort_ranked_news(&mut news_ranked);

    let web_page = page(&web_ranked, offset, limit);
    let news_page = page(&news_ranked, offset, limit);
    let count = (web_ranked.len() + news_ranked.len())
        .max(offset + web_page.len() + news_page.len());

    Ok(SearchResponse {
        results: SearchResults {
            web: web_page,
            news: news_page,
        },
        count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorting_breaks_score_ties_by_url() {
        let mut items = vec![
            WebSearchItem {
                title: "b".into(),
                description: String::new(),
                url: "https://b.example.com/".into(),
                score: 10.0,
            },
            WebSearchItem {
                title: "a".into(),
                description: String::new(),
                url: "https://a.example.com/".into(),
                score: 10.0,
            },
            WebSearchItem {
                title: "c".into(),
                description: String::new(),
                url: "https://c.example.com/".into(),
                score: 50.0,
            },
        ];
        sort_ranked_web(&mut items);
        let urls: Vec<&str> = items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://c.example.com/",
                "https://a.example.com/",
                "https://b.example.com/",
            ]
        );
    }

    #[test]
    fn paging_is_offset_and_limit() {
        let items: Vec<i32> = (0..10).collect();
        assert_eq!(page(&items, 2, 3), vec![2, 3, 4]);
        assert_eq!(page(&items, 9, 5), vec![9]);
        assert!(page(&items, 20, 5).is_empty());
    }
}
