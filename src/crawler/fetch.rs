use std::borrow::Cow;

use reqwest::Client;

/// What a fetched body turned out to be, decided from the Content-Type
/// header plus a cheap sniff of the leading bytes for mislabeled feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    Html,
    Feed,
    Other,
}

#[derive(Debug)]
pub struct FetchedPage {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl FetchedPage {
    pub fn kind(&self) -> BodyKind {
        classify_body(&self.content_type, &self.body)
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Plain GET with the client's configured timeout, redirect policy and
/// User-Agent. I/O failures bubble up for the caller to classify.
pub async fn fetch_page(client: &Client, url: &str) -> Result<FetchedPage, reqwest::Error> {
    let response = client.get(url).header("Accept", "text/html").send().await?;
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = response.bytes().await?.to_vec();
    Ok(FetchedPage {
        status,
        content_type,
        body,
    })
}

fn classify_body(content_type: &str, body: &[u8]) -> BodyKind {
    let ct = content_type.to_ascii_lowercase();
    if ct.contains("rss") || ct.contains("atom") {
        return BodyKind::Feed;
    }
    if ct.contains("xml") {
        // Generic XML: look at the opening bytes for a feed root element.
        let head = String::from_utf8_lossy(&body[..body.len().min(512)]).to_ascii_lowercase();
        if head.contains("<rss") || head.contains("<feed") || head.contains("<atom") {
            return BodyKind::Feed;
        }
    }
    if ct.contains("text/html") {
        return BodyKind::Html;
    }
    BodyKind::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(content_type: &str, body: &str) -> FetchedPage {
        FetchedPage {
            status: 200,
            content_type: content_type.to_string(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn classifies_html() {
        assert_eq!(page("text/html; charset=utf-8", "<html>").kind(), BodyKind::Html);
    }

    #[test]
    fn classifies_feed_content_types() {
        assert_eq!(page("application/rss+xml", "").kind(), BodyKind::Feed);
        assert_eq!(page("application/atom+xml", "").kind(), BodyKind::Feed);
    }

    #[test]
    fn sniffs_generic_xml_feeds() {
        let body = r#"<?xml version="1.0"?><rss version="2.0"><channel></channel></rss>"#;
        assert_eq!(page("application/xml", body).kind(), BodyKind::Feed);
        assert_eq!(page("text/xml", "<settings></settings>").kind(), BodyKind::Other);
    }

    #[test]
    fn everything_else_is_other() {
        assert_eq!(page("application/pdf", "%PDF").kind(), BodyKind::Other);
        assert_eq!(page("", "").kind(), BodyKind::Other);
    }
}
