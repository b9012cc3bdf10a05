use super::api_client::{ApiClient, Auth};
use crate::errors::AppError;
use crate::models::Lead;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

const API_VERSION: &str = "2021-07-28";

/// Opportunity as returned by the search endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GhlOpportunity {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pipeline_id: Option<String>,
    #[serde(default)]
    pub pipeline_stage_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpportunitySearch {
    #[serde(default)]
    opportunities: Vec<GhlOpportunity>,
    #[serde(default)]
    meta: Option<SearchMeta>,
}

#[derive(Debug, Deserialize)]
struct SearchMeta {
    #[serde(default)]
    total: u64,
}

/// GoHighLevel (LeadConnector) API v2 client, scoped to one location.
#[derive(Clone)]
pub struct GhlClient {
    api: ApiClient,
    location_id: String,
    pipeline_id: Option<String>,
}

impl GhlClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        location_id: &str,
        pipeline_id: Option<String>,
    ) -> Result<Self, AppError> {
        let api = ApiClient::new("GoHighLevel", base_url, Auth::Bearer(api_key.to_string()))?
            .with_header("Version", API_VERSION);

        Ok(Self {
            api,
            location_id: location_id.to_string(),
            pipeline_id,
        })
    }

    /// Creates or updates a contact (matched by email/phone) and returns its id.
    pub async fn upsert_contact(&self, lead: &Lead) -> Result<String, AppError> {
        let mut body = serde_json::Map::new();
        body.insert("locationId".to_string(), json!(self.location_id));
        body.insert("firstName".to_string(), json!(lead.first_name()));
        if let Some(last) = lead.last_name() {
            body.insert("lastName".to_string(), json!(last));
        }
        if let Some(email) = &lead.email {
            body.insert("email".to_string(), json!(email));
        }
        if let Some(phone) = &lead.phone {
            body.insert("phone".to_string(), json!(phone));
        }
        if let Some(company) = &lead.company {
            body.insert("companyName".to_string(), json!(company));
        }
        if let Some(website) = &lead.website {
            body.insert("website".to_string(), json!(website));
        }
        body.insert("source".to_string(), json!(lead.source.as_str()));
        body.insert("tags".to_string(), json!(lead.crm_tags()));

        let response: Value = self.api.post_json("/contacts/upsert", &body).await?;

        let contact_id = response
            .get("contact")
            .and_then(|c| c.get("id"))
            .and_then(|id| id.as_str())
            .ok_or_else(|| {
                tracing::warn!("Unexpected GoHighLevel upsert response: {:?}", response);
                AppError::ExternalApiError("Contact upsert response missing 'contact.id'".to_string())
            })?;

        tracing::info!("✓ GoHighLevel contact upserted: {} ({})", lead.name, contact_id);
        Ok(contact_id.to_string())
    }

    pub async fn add_note(&self, contact_id: &str, body: &str) -> Result<(), AppError> {
        let _: Value = self
            .api
            .post_json(
                &format!("/contacts/{}/notes", contact_id),
                &json!({ "body": body }),
            )
            .await?;
        Ok(())
    }

    pub async fn send_sms(&self, contact_id: &str, message: &str) -> Result<(), AppError> {
        let _: Value = self
            .api
            .post_json(
                "/conversations/messages",
                &json!({
                    "type": "SMS",
                    "contactId": contact_id,
                    "message": message,
                }),
            )
            .await?;
        tracing::info!("✓ SMS sent to GoHighLevel contact {}", contact_id);
        Ok(())
    }

    /// First opportunity for the contact in the configured pipeline, if any.
    pub async fn find_opportunity(
        &self,
        contact_id: &str,
    ) -> Result<Option<GhlOpportunity>, AppError> {
        let mut query = vec![
            ("location_id", self.location_id.as_str()),
            ("contact_id", contact_id),
        ];
        if let Some(pipeline) = &self.pipeline_id {
            query.push(("pipeline_id", pipeline.as_str()));
        }

        let search: OpportunitySearch = self.api.get_json("/opportunities/search", &query).await?;
        Ok(search.opportunities.into_iter().next())
    }

    /// Creates the contact's opportunity or moves it to `stage_id`.
    pub async fn upsert_opportunity(
        &self,
        contact_id: &str,
        stage_id: &str,
        name: &str,
    ) -> Result<String, AppError> {
        let pipeline_id = self.pipeline_id.as_deref().ok_or_else(|| {
            AppError::NotConfigured("GHL_PIPELINE_ID".to_string())
        })?;

        let response: Value = self
            .api
            .post_json(
                "/opportunities/upsert",
                &json!({
                    "locationId": self.location_id,
                    "pipelineId": pipeline_id,
                    "pipelineStageId": stage_id,
                    "contactId": contact_id,
                    "name": name,
                    "status": "open",
                }),
            )
            .await?;

        let id = response
            .get("opportunity")
            .and_then(|o| o.get("id"))
            .and_then(|id| id.as_str())
            .ok_or_else(|| {
                AppError::ExternalApiError(
                    "Opportunity upsert response missing 'opportunity.id'".to_string(),
                )
            })?;

        Ok(id.to_string())
    }

    /// Number of opportunities currently in a pipeline stage.
    pub async fn count_opportunities(&self, stage_id: &str) -> Result<u64, AppError> {
        let mut query = vec![
            ("location_id", self.location_id.as_str()),
            ("pipeline_stage_id", stage_id),
            ("limit", "1"),
        ];
        if let Some(pipeline) = &self.pipeline_id {
            query.push(("pipeline_id", pipeline.as_str()));
        }

        let search: OpportunitySearch = self.api.get_json("/opportunities/search", &query).await?;
        Ok(search.meta.map(|m| m.total).unwrap_or(0))
    }

    pub async fn create_appointment(
        &self,
        calendar_id: &str,
        contact_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        title: &str,
    ) -> Result<String, AppError> {
        let response: Value = self
            .api
            .post_json(
                "/calendars/events/appointments",
                &json!({
                    "calendarId": calendar_id,
                    "locationId": self.location_id,
                    "contactId": contact_id,
                    "startTime": start.to_rfc3339(),
                    "endTime": end.to_rfc3339(),
                    "title": title,
                    "appointmentStatus": "confirmed",
                }),
            )
            .await?;

        response
            .get("id")
            .and_then(|id| id.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::ExternalApiError("Appointment response missing 'id'".to_string())
            })
    }
}
