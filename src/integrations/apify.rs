use super::api_client::{ApiClient, Auth};
use crate::errors::AppError;
use crate::models::{Lead, LeadSource, Vertical};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Which scraper actor to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScraperKind {
    GoogleMaps,
    Linkedin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub kind: ScraperKind,
    /// Search terms, e.g. "dentist" or "law firm owner".
    pub query: String,
    pub location: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_max_results() -> u32 {
    50
}

impl ScrapeRequest {
    /// Actor input payload.
    pub fn actor_input(&self) -> Value {
        match self.kind {
            ScraperKind::GoogleMaps => json!({
                "searchStringsArray": [self.query],
                "locationQuery": self.location,
                "maxCrawledPlacesPerSearch": self.max_results,
                "language": "en",
            }),
            ScraperKind::Linkedin => json!({
                "searchQuery": self.query,
                "location": self.location,
                "maxItems": self.max_results,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RunEnvelope {
    data: RunData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunData {
    id: String,
    #[serde(default)]
    default_dataset_id: Option<String>,
}

/// A started actor run.
#[derive(Debug, Clone, Serialize)]
pub struct ActorRun {
    pub run_id: String,
    pub dataset_id: Option<String>,
}

/// Apify API v2 client for the lead scrapers.
#[derive(Clone)]
pub struct ApifyClient {
    api: ApiClient,
    google_maps_actor: String,
    linkedin_actor: String,
}

impl ApifyClient {
    pub fn new(
        base_url: &str,
        token: &str,
        google_maps_actor: &str,
        linkedin_actor: &str,
    ) -> Result<Self, AppError> {
        Ok(Self {
            api: ApiClient::new(
                "Apify",
                base_url,
                Auth::Query {
                    param: "token",
                    value: token.to_string(),
                },
            )?,
            google_maps_actor: google_maps_actor.to_string(),
            linkedin_actor: linkedin_actor.to_string(),
        })
    }

    pub async fn start_actor(&self, request: &ScrapeRequest) -> Result<ActorRun, AppError> {
        if request.query.trim().is_empty() {
            return Err(AppError::BadRequest("Scrape query must not be empty".to_string()));
        }

        let actor = match request.kind {
            ScraperKind::GoogleMaps => &self.google_maps_actor,
            ScraperKind::Linkedin => &self.linkedin_actor,
        };

        let run: RunEnvelope = self
            .api
            .post_json(&format!("/acts/{}/runs", actor), &request.actor_input())
            .await?;

        tracing::info!(
            "🚀 Started {} scrape '{}' in {} (run {})",
            actor,
            request.query,
            request.location,
            run.data.id
        );

        Ok(ActorRun {
            run_id: run.data.id,
            dataset_id: run.data.default_dataset_id,
        })
    }

    pub async fn dataset_items(&self, dataset_id: &str) -> Result<Vec<Value>, AppError> {
        self.api
            .get_json(
                &format!("/datasets/{}/items", dataset_id),
                &[("clean", "true"), ("format", "json")],
            )
            .await
    }
}

fn str_field<'a>(item: &'a Value, key: &str) -> Option<&'a str> {
    item.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn owned(item: &Value, key: &str) -> Option<String> {
    str_field(item, key).map(str::to_string)
}

/// Maps a scraped dataset record to a lead.
///
/// Google Maps places carry `title` and `categoryName`; LinkedIn profiles carry
/// `fullName` or `linkedinUrl`. Records without a usable name yield `None`.
pub fn lead_from_item(item: &Value) -> Option<Lead> {
    let mut lead = if item.get("categoryName").is_some() || item.get("placeId").is_some() {
        let title = str_field(item, "title")?;
        let mut lead = Lead::new(title, LeadSource::GoogleMaps);
        lead.company = Some(title.to_string());
        lead.phone = owned(item, "phoneUnformatted").or_else(|| owned(item, "phone"));
        lead.email = item
            .get("emails")
            .and_then(Value::as_array)
            .and_then(|emails| emails.iter().filter_map(Value::as_str).next())
            .map(str::to_string)
            .or_else(|| owned(item, "email"));
        lead.website = owned(item, "website");
        lead.location = owned(item, "address").or_else(|| owned(item, "city"));
        if let Some(category) = str_field(item, "categoryName") {
            lead.vertical = Vertical::from_category(category);
        }
        lead
    } else if item.get("fullName").is_some() || item.get("linkedinUrl").is_some() {
        let name = owned(item, "fullName").or_else(|| {
            let first = str_field(item, "firstName")?;
            Some(match str_field(item, "lastName") {
                Some(last) => format!("{} {}", first, last),
                None => first.to_string(),
            })
        })?;
        let mut lead = Lead::new(name, LeadSource::LinkedIn);
        lead.email = owned(item, "email");
        lead.phone = owned(item, "mobileNumber").or_else(|| owned(item, "phone"));
        lead.company = owned(item, "companyName");
        lead.job_title = owned(item, "jobTitle").or_else(|| owned(item, "headline"));
        lead.linkedin_url = owned(item, "linkedinUrl");
        lead.website = owned(item, "companyWebsite");
        lead.location = owned(item, "addressWithCountry").or_else(|| owned(item, "location"));
        let industry = owned(item, "companyIndustry")
            .or_else(|| lead.job_title.clone())
            .unwrap_or_default();
        lead.vertical = Vertical::from_category(&industry);
        lead
    } else {
        return None;
    };

    lead.rescore();
    Some(lead)
}
