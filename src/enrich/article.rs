// src/enrich/article.rs
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};

use super::{collapse_ws, read_capped_text, ArticleExtractor};
use crate::source::USER_AGENT;

/// Paragraph text below this length is treated as "no article container found".
const MIN_ARTICLE_CHARS: usize = 200;

/// Reader-mode style extraction: paragraphs of the main content container.
#[derive(Clone)]
pub struct ReadableTextExtractor {
    http: Client,
}

impl ReadableTextExtractor {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .context("build article client")?;
        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl ArticleExtractor for ReadableTextExtractor {
    async fn article_text(&self, url: &str) -> Result<String> {
        let resp = self
            .http
            .get(url)
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await
            .context("article request")?;
        if resp.status() != StatusCode::OK {
            bail!("failed to fetch URL: status {}", resp.status().as_u16());
        }
        let html = read_capped_text(resp).await?;
        let text = extract_article_text(&html);
        tracing::debug!(target: "scraper", url, chars = text.len(), "article text extracted");
        Ok(text)
    }
}

/// Text of the `<p>` elements inside the first `article`/`main` container that
/// holds enough prose, falling back to the whole body.
pub fn extract_article_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let Ok(p_sel) = Selector::parse("p") else {
        return String::new();
    };

    for container in ["article", "main", "[role='main']"] {
        let Ok(sel) = Selector::parse(container) else {
            continue;
        };
        for el in doc.select(&sel) {
            let text = el
                .select(&p_sel)
                .map(|p| collapse_ws(&p.text().collect::<String>()))
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n\n");
            if text.len() >= MIN_ARTICLE_CHARS {
                return text;
            }
        }
    }

    let paragraphs = doc
        .select(&p_sel)
        .map(|p| collapse_ws(&p.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>();
    if !paragraphs.is_empty() {
        return paragraphs.join("\n\n");
    }

    Selector::parse("body")
        .ok()
        .and_then(|sel| doc.select(&sel).next())
        .map(|body| collapse_ws(&body.text().collect::<Vec<_>>().join(" ")))
        .unwrap_or_default()
}
