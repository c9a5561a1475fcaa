// src/enrich/opengraph.rs
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use super::{collapse_ws, read_capped_text, ContentEnricher};
use crate::source::USER_AGENT;
use crate::types::SecondaryMetadata;

/// Scrapes `og:image` / `og:description` from a page.
#[derive(Clone)]
pub struct OpenGraphEnricher {
    http: Client,
    request_timeout: Duration,
}

impl OpenGraphEnricher {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(20))
            .build()
            .context("build enrichment client")?;
        Ok(Self {
            http,
            request_timeout: Duration::from_secs(8),
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl ContentEnricher for OpenGraphEnricher {
    async fn metadata(&self, raw_url: &str) -> Result<SecondaryMetadata> {
        let url = Url::parse(raw_url).context("invalid URL")?;
        if url.scheme() != "http" && url.scheme() != "https" {
            bail!("invalid URL scheme: {}", url.scheme());
        }

        let start = Instant::now();
        let resp = self
            .http
            .get(url.clone())
            .timeout(self.request_timeout)
            .send()
            .await
            .context("page request")?;

        if resp.url() != &url {
            debug!(target: "scraper", event = "redirect_detected", original_url = %url, final_url = %resp.url());
        }

        // Some sites still serve OpenGraph tags on error pages, so the status is not fatal.
        let status = resp.status();
        if status.is_client_error() || status.is_server_error() {
            debug!(target: "scraper", event = "error_status", status_code = status.as_u16(), url = %url);
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !content_type.is_empty() && !content_type.contains("html") {
            debug!(target: "scraper", event = "content_type_skip", content_type = %content_type);
            return Ok(SecondaryMetadata::default());
        }

        let page_url = resp.url().clone();
        let body = read_capped_text(resp).await?;
        let meta = parse_opengraph(&body, &page_url);

        info!(
            target: "scraper",
            event = "scrape_completed",
            url = %url,
            has_image = meta.image.is_some(),
            has_description = meta.description.is_some(),
            duration_ms = start.elapsed().as_millis() as u64,
        );
        Ok(meta)
    }
}

/// Pull OpenGraph image/description out of an HTML document.
/// A relative image URL is resolved against `base`.
pub fn parse_opengraph(html: &str, base: &Url) -> SecondaryMetadata {
    let doc = Html::parse_document(html);
    let content_of = |property: &str| -> Option<String> {
        let sel = Selector::parse(&format!("meta[property='{property}']")).ok()?;
        doc.select(&sel)
            .filter_map(|el| el.value().attr("content"))
            .map(str::trim)
            .find(|c| !c.is_empty())
            .map(str::to_string)
    };

    let image = content_of("og:image").and_then(|raw| resolve_url(base, &raw));
    let description = content_of("og:description")
        .map(|d| collapse_ws(&html_escape::decode_html_entities(&d)))
        .filter(|d| !d.is_empty());

    SecondaryMetadata { image, description }
}

fn resolve_url(base: &Url, raw: &str) -> Option<String> {
    match Url::parse(raw) {
        Ok(abs) => Some(abs.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => base.join(raw).ok().map(|u| u.to_string()),
        Err(_) => None,
    }
}
