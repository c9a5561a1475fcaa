// src/replica/turso.rs
//! libSQL/Turso mirror over the HTTP pipeline API (`/v2/pipeline`).
//!
//! The whole sync runs as one conditional batch inside a transaction: each step
//! only runs if the previous one succeeded, so a failure leaves the replica as it was.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::ReplicaSink;
use crate::config::TursoCredentials;
use crate::types::Item;

#[derive(Clone)]
pub struct TursoReplica {
    client: Client,
    pipeline_url: String,
    auth_token: String,
}

impl TursoReplica {
    pub fn new(creds: TursoCredentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("build turso client")?;
        Ok(Self {
            client,
            pipeline_url: pipeline_url(&creds.url),
            auth_token: creds.auth_token,
        })
    }
}

/// `libsql://db.turso.io` → `https://db.turso.io/v2/pipeline`.
pub fn pipeline_url(db_url: &str) -> String {
    let base = match db_url.strip_prefix("libsql://") {
        Some(rest) => format!("https://{rest}"),
        None => db_url.to_string(),
    };
    format!("{}/v2/pipeline", base.trim_end_matches('/'))
}

fn int_arg(v: i64) -> Value {
    // hrana carries 64-bit integers as strings
    json!({ "type": "integer", "value": v.to_string() })
}

fn text_arg(v: &str) -> Value {
    json!({ "type": "text", "value": v })
}

/// Pipeline body replacing the replica's rows with `items`.
pub fn build_sync_request(items: &[Item], now: i64) -> Value {
    let mut stmts: Vec<Value> = vec![json!({ "sql": "BEGIN" })];

    if items.is_empty() {
        stmts.push(json!({ "sql": "DELETE FROM top_stories" }));
    } else {
        let placeholders = vec!["?"; items.len()].join(", ");
        let args: Vec<Value> = items.iter().map(|it| int_arg(it.id as i64)).collect();
        stmts.push(json!({
            "sql": format!("DELETE FROM top_stories WHERE hn_id NOT IN ({placeholders})"),
            "args": args,
        }));
    }

    for it in items {
        stmts.push(json!({
            "sql": "INSERT INTO top_stories (hn_id, title, domain, added_at) VALUES (?, ?, ?, ?) \
                    ON CONFLICT(hn_id) DO UPDATE SET title = excluded.title, domain = excluded.domain",
            "args": [int_arg(it.id as i64), text_arg(&it.title), text_arg(&it.domain()), int_arg(now)],
        }));
    }
    stmts.push(json!({ "sql": "COMMIT" }));

    let steps: Vec<Value> = stmts
        .into_iter()
        .enumerate()
        .map(|(i, stmt)| {
            if i == 0 {
                json!({ "stmt": stmt })
            } else {
                json!({ "condition": { "type": "ok", "step": i - 1 }, "stmt": stmt })
            }
        })
        .collect();

    json!({
        "requests": [
            { "type": "batch", "batch": { "steps": steps } },
            { "type": "close" }
        ]
    })
}

#[derive(Debug, Deserialize)]
struct PipelineResponse {
    results: Vec<PipelineResult>,
}

#[derive(Debug, Deserialize)]
struct PipelineResult {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    response: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// First error reported anywhere in the batch result, if any.
fn batch_error(resp: &PipelineResponse) -> Option<String> {
    let first = resp.results.first()?;
    if first.kind != "ok" {
        return Some(
            first
                .error
                .as_ref()
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("pipeline error")
                .to_string(),
        );
    }
    let step_errors = first
        .response
        .as_ref()
        .and_then(|r| r.pointer("/result/step_errors"))
        .and_then(Value::as_array)?;
    step_errors.iter().find(|e| !e.is_null()).map(|e| {
        e.get("message")
            .and_then(Value::as_str)
            .unwrap_or("step failed")
            .to_string()
    })
}

#[async_trait::async_trait]
impl ReplicaSink for TursoReplica {
    async fn sync_top(&self, items: &[Item]) -> Result<()> {
        let body = build_sync_request(items, chrono::Utc::now().timestamp());
        let resp: PipelineResponse = self
            .client
            .post(&self.pipeline_url)
            .bearer_auth(&self.auth_token)
            .json(&body)
            .send()
            .await
            .context("turso pipeline request")?
            .error_for_status()
            .context("turso non-2xx")?
            .json()
            .await
            .context("turso decode")?;
        if let Some(msg) = batch_error(&resp) {
            return Err(anyhow!("turso sync failed: {msg}"));
        }
        tracing::info!(target: "replica", event = "turso_sync_completed", synced_count = items.len());
        Ok(())
    }
}
