use super::api_client::{ApiClient, Auth};
use crate::errors::AppError;
use crate::models::{EmailVariant, Lead};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Campaign counters used by the metrics report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignAnalytics {
    #[serde(default, alias = "emails_sent_count")]
    pub emails_sent: u64,
    #[serde(default, alias = "reply_count")]
    pub replies: u64,
    #[serde(default, alias = "bounced_count")]
    pub bounced: u64,
    #[serde(default, alias = "total_opportunities")]
    pub opportunities: u64,
}

impl CampaignAnalytics {
    pub fn merge(&mut self, other: &CampaignAnalytics) {
        self.emails_sent += other.emails_sent;
        self.replies += other.replies;
        self.bounced += other.bounced;
        self.opportunities += other.opportunities;
    }
}

/// Instantly.ai API v2 client for cold-email campaigns.
#[derive(Clone)]
pub struct InstantlyClient {
    api: ApiClient,
}

impl InstantlyClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, AppError> {
        Ok(Self {
            api: ApiClient::new("Instantly", base_url, Auth::Bearer(api_key.to_string()))?,
        })
    }

    /// Adds a lead to a campaign, optionally with a generated opener.
    pub async fn add_lead(
        &self,
        campaign_id: &str,
        lead: &Lead,
        personalization: Option<&EmailVariant>,
    ) -> Result<String, AppError> {
        let email = lead.email.as_deref().ok_or_else(|| {
            AppError::BadRequest(format!("Lead '{}' has no email for outreach", lead.name))
        })?;

        let mut custom_variables = serde_json::Map::new();
        custom_variables.insert("vertical".to_string(), json!(lead.vertical.as_str()));
        custom_variables.insert("quality_score".to_string(), json!(lead.quality_score));
        if let Some(variant) = personalization {
            custom_variables.insert("ai_subject".to_string(), json!(variant.subject));
            custom_variables.insert("ai_approach".to_string(), json!(variant.approach.as_str()));
        }

        let body = json!({
            "campaign": campaign_id,
            "email": email,
            "first_name": lead.first_name(),
            "last_name": lead.last_name(),
            "company_name": lead.company,
            "phone": lead.phone,
            "website": lead.website,
            "personalization": personalization.map(|v| v.body.as_str()),
            "custom_variables": custom_variables,
        });

        let response: Value = self.api.post_json("/leads", &body).await?;
        let id = response
            .get("id")
            .and_then(|id| id.as_str())
            .unwrap_or_default()
            .to_string();

        tracing::info!("✓ Added {} to Instantly campaign {}", email, campaign_id);
        Ok(id)
    }

    pub async fn campaign_analytics(&self, campaign_id: &str) -> Result<CampaignAnalytics, AppError> {
        // The endpoint returns one row per requested campaign
        let rows: Vec<CampaignAnalytics> = self
            .api
            .get_json("/campaigns/analytics", &[("id", campaign_id)])
            .await?;

        let mut total = CampaignAnalytics::default();
        for row in &rows {
            total.merge(row);
        }
        Ok(total)
    }
}
