use super::api_client::{ApiClient, Auth};
use crate::errors::AppError;
use crate::models::Lead;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<HubSpotObject>,
}

#[derive(Debug, Deserialize)]
struct HubSpotObject {
    id: String,
}

/// HubSpot CRM mirror for prospects.
#[derive(Clone)]
pub struct HubSpotClient {
    api: ApiClient,
}

impl HubSpotClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, AppError> {
        Ok(Self {
            api: ApiClient::new("HubSpot", base_url, Auth::Bearer(token.to_string()))?,
        })
    }

    pub async fn find_contact_by_email(&self, email: &str) -> Result<Option<String>, AppError> {
        let body = json!({
            "filterGroups": [{
                "filters": [{
                    "propertyName": "email",
                    "operator": "EQ",
                    "value": email,
                }]
            }],
            "properties": ["email"],
            "limit": 1,
        });

        let response: SearchResponse = self
            .api
            .post_json("/crm/v3/objects/contacts/search", &body)
            .await?;
        Ok(response.results.into_iter().next().map(|c| c.id))
    }

    pub async fn create_contact(&self, lead: &Lead) -> Result<String, AppError> {
        let body = json!({
            "properties": {
                "email": lead.email,
                "firstname": lead.first_name(),
                "lastname": lead.last_name(),
                "phone": lead.phone,
                "company": lead.company,
                "jobtitle": lead.job_title,
                "website": lead.website,
                "hs_lead_status": "NEW",
            }
        });

        let created: HubSpotObject = self.api.post_json("/crm/v3/objects/contacts", &body).await?;
        tracing::info!("✓ HubSpot contact created: {} ({})", lead.name, created.id);
        Ok(created.id)
    }

    /// Creates the contact unless one with the same email already exists.
    ///
    /// Returns the contact id and whether it was created.
    pub async fn sync_lead(&self, lead: &Lead) -> Result<(String, bool), AppError> {
        if let Some(email) = lead.email.as_deref() {
            if let Some(id) = self.find_contact_by_email(email).await? {
                tracing::debug!("HubSpot contact already exists for {}", email);
                return Ok((id, false));
            }
        }

        let id = self.create_contact(lead).await?;
        Ok((id, true))
    }
}
