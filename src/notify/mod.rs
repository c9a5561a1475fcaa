// src/notify/mod.rs
pub mod onesignal;

use anyhow::Result;

use crate::types::EnrichedItem;

pub use onesignal::OneSignalSink;

/// Push delivery. Called from a detached task; errors are only logged.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, item: &EnrichedItem) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Wired when push credentials are absent: logs and succeeds.
pub struct DisabledSink;

#[async_trait::async_trait]
impl NotificationSink for DisabledSink {
    async fn notify(&self, item: &EnrichedItem) -> Result<()> {
        tracing::debug!(
            target: "notify",
            story_id = item.id(),
            "push disabled (no ONESIGNAL_APP_ID/ONESIGNAL_KEY)"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}
