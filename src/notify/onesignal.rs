use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::NotificationSink;
use crate::config::OneSignalCredentials;
use crate::types::EnrichedItem;

pub const ONESIGNAL_API: &str = "https://api.onesignal.com/api/v1/notifications";
const SEGMENT: &str = "Total Subscriptions";
const HEADING: &str = "Top Story on Hacker News";

#[derive(Clone)]
pub struct OneSignalSink {
    client: Client,
    endpoint: String,
    creds: OneSignalCredentials,
}

impl OneSignalSink {
    pub fn new(creds: OneSignalCredentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("build onesignal client")?;
        Ok(Self {
            client,
            endpoint: ONESIGNAL_API.to_string(),
            creds,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Serialize)]
struct LangMap<'a> {
    en: &'a str,
}

#[derive(Serialize)]
struct Notification<'a> {
    app_id: &'a str,
    included_segments: [&'a str; 1],
    headings: LangMap<'a>,
    contents: LangMap<'a>,
    url: String,
    /// One topic per story so pushes don't replace each other.
    web_push_topic: String,
    priority: u8,
}

impl<'a> Notification<'a> {
    fn for_item(app_id: &'a str, item: &'a EnrichedItem) -> Self {
        Self {
            app_id,
            included_segments: [SEGMENT],
            headings: LangMap { en: HEADING },
            contents: LangMap {
                en: &item.item.title,
            },
            url: format!("{}?ref=hn30", item.item.url),
            web_push_topic: format!("hn30_notifications-{}", item.id()),
            priority: 10,
        }
    }
}

#[derive(Deserialize)]
struct CreateResponse {
    #[serde(default)]
    id: Option<String>,
}

#[async_trait::async_trait]
impl NotificationSink for OneSignalSink {
    async fn notify(&self, item: &EnrichedItem) -> Result<()> {
        let payload = Notification::for_item(&self.creds.app_id, item);
        let rsp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Key {}", self.creds.api_key))
            .json(&payload)
            .send()
            .await
            .context("onesignal post")?;
        let status = rsp.status();
        if !status.is_success() {
            return Err(anyhow!("onesignal HTTP error: {status}"));
        }
        let body: CreateResponse = rsp.json().await.context("onesignal decode")?;
        tracing::info!(
            target: "notify",
            event = "notification_sent",
            story_id = item.id(),
            notification_id = body.id.as_deref().unwrap_or(""),
            http_status = status.as_u16(),
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "onesignal"
    }
}
