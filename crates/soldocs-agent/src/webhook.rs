//! Fire-and-forget completion notifications. Failures are the caller's to
//! swallow; documentation state never depends on the webhook.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use soldocs_core::{Documentation, Result, SolDocsError};

pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

const OVERVIEW_EXCERPT_CHARS: usize = 500;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    event: &'static str,
    program_id: &'a str,
    name: &'a str,
    timestamp: String,
    documentation: WebhookDocumentation<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookDocumentation<'a> {
    overview: String,
    instruction_count: usize,
    idl_hash: &'a str,
    generated_at: DateTime<Utc>,
}

pub async fn notify_completion(
    http: &reqwest::Client,
    url: &str,
    doc: &Documentation,
) -> Result<()> {
    let payload = WebhookPayload {
        event: "doc.completed",
        program_id: &doc.program_id,
        name: &doc.name,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        documentation: WebhookDocumentation {
            overview: doc.overview.chars().take(OVERVIEW_EXCERPT_CHARS).collect(),
            instruction_count: doc.instructions.matches("###").count().max(1),
            idl_hash: &doc.idl_hash,
            generated_at: doc.generated_at,
        },
    };

    let response = http
        .post(url)
        .timeout(WEBHOOK_TIMEOUT)
        .json(&payload)
        .send()
        .await
        .map_err(|err| SolDocsError::Webhook(err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SolDocsError::Webhook(format!(
            "Webhook returned HTTP {}",
            status.as_u16()
        )));
    }
    Ok(())
}
