use super::api_client::{ApiClient, Auth};
use crate::errors::AppError;
use serde_json::{json, Value};

/// Posts messages to a Slack incoming webhook.
#[derive(Clone)]
pub struct SlackNotifier {
    api: ApiClient,
}

impl SlackNotifier {
    /// `webhook_url` is the full incoming-webhook URL.
    pub fn new(webhook_url: &str) -> Result<Self, AppError> {
        Ok(Self {
            api: ApiClient::new("Slack", webhook_url, Auth::None)?,
        })
    }

    /// Sends a message. `text` is the notification fallback when blocks are present.
    pub async fn send(&self, text: &str, blocks: Option<Vec<Value>>) -> Result<(), AppError> {
        let mut payload = json!({ "text": text });
        if let Some(blocks) = blocks {
            payload["blocks"] = Value::Array(blocks);
        }

        self.api.post_text("", &payload).await?;
        Ok(())
    }

    pub async fn notify_error(&self, context: &str, message: &str) -> Result<(), AppError> {
        let blocks = vec![
            header_block(&format!("🚨 {}", context)),
            section_block(&format!("```{}```", message)),
            context_block(&format!("agency-ops • {}", chrono::Utc::now().to_rfc3339())),
        ];
        self.send(&format!("Error in {}: {}", context, message), Some(blocks))
            .await
    }
}

pub fn header_block(text: &str) -> Value {
    json!({
        "type": "header",
        "text": { "type": "plain_text", "text": text, "emoji": true }
    })
}

pub fn section_block(markdown: &str) -> Value {
    json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": markdown }
    })
}

/// Two-column section, one `*label*\nvalue` cell per pair.
pub fn fields_block(fields: &[(&str, String)]) -> Value {
    let fields: Vec<Value> = fields
        .iter()
        .map(|(label, value)| json!({ "type": "mrkdwn", "text": format!("*{}*\n{}", label, value) }))
        .collect();
    json!({ "type": "section", "fields": fields })
}

pub fn context_block(text: &str) -> Value {
    json!({
        "type": "context",
        "elements": [{ "type": "mrkdwn", "text": text }]
    })
}
