// src/enrich/mod.rs
//! Secondary metadata and article text pulled from a story's own page.
//!
//! Both collaborators talk to arbitrary third-party sites, so every fetch is
//! time-bounded and body-capped.

pub mod article;
pub mod opengraph;

use anyhow::{Context, Result};
use futures::TryStreamExt;

use crate::proxy::{cap_stream, MAX_PAYLOAD_BYTES};
use crate::types::SecondaryMetadata;

pub use article::ReadableTextExtractor;
pub use opengraph::OpenGraphEnricher;

/// Fetches image/description for a URL.
///
/// `Ok(SecondaryMetadata::default())` means "page fetched, nothing found";
/// `Err` is reserved for transport and parse failures.
#[async_trait::async_trait]
pub trait ContentEnricher: Send + Sync {
    async fn metadata(&self, url: &str) -> Result<SecondaryMetadata>;
}

/// Extracts readable article text for summarization.
#[async_trait::async_trait]
pub trait ArticleExtractor: Send + Sync {
    async fn article_text(&self, url: &str) -> Result<String>;
}

/// Read at most `MAX_PAYLOAD_BYTES` of a response body as (lossy) UTF-8.
pub(crate) async fn read_capped_text(resp: reqwest::Response) -> Result<String> {
    let chunks: Vec<_> = cap_stream(resp.bytes_stream(), MAX_PAYLOAD_BYTES)
        .try_collect()
        .await
        .context("read body")?;
    let body: Vec<u8> = chunks.concat();
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Collapse runs of whitespace and trim.
pub fn collapse_ws(s: &str) -> String {
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("static regex"));
    re_ws.replace_all(s, " ").trim().to_string()
}
