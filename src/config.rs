use crate::models::OpportunityStage;
use crate::resilience::{RateLimit, RetryPolicy};
use std::collections::HashMap;
use std::time::Duration;

const MAX_METRICS_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// Runtime configuration, loaded from the environment (and `.env` when present).
///
/// Every integration is optional: a missing credential disables the
/// corresponding client instead of failing startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub webhook_secret: Option<String>,

    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub ai_max_requests_per_minute: usize,
    pub ai_retry_max_attempts: u32,
    pub ai_retry_base_delay_ms: u64,
    pub ai_retry_max_delay_ms: u64,

    pub sender_name: String,
    pub sender_company: String,
    pub sender_offer: String,

    pub ghl_api_key: Option<String>,
    pub ghl_location_id: Option<String>,
    pub ghl_pipeline_id: Option<String>,
    /// Calendar that mirrors Cal.com bookings as GoHighLevel appointments.
    pub ghl_calendar_id: Option<String>,
    /// Pipeline stage id per opportunity stage (`GHL_STAGE_<STAGE>`).
    pub ghl_stage_ids: HashMap<OpportunityStage, String>,
    pub ghl_base_url: String,

    pub instantly_api_key: Option<String>,
    pub instantly_campaign_ids: Vec<String>,
    pub instantly_base_url: String,

    pub hubspot_token: Option<String>,
    pub hubspot_base_url: String,

    pub calcom_api_key: Option<String>,
    pub calcom_event_type_id: Option<i64>,
    pub calcom_base_url: String,

    pub apify_token: Option<String>,
    pub apify_base_url: String,
    pub apify_google_maps_actor: String,
    pub apify_linkedin_actor: String,

    pub slack_webhook_url: Option<String>,

    pub metrics_cache_ttl_secs: u64,
    pub metrics_report_interval_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            webhook_secret: None,
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            ai_max_requests_per_minute: 10,
            ai_retry_max_attempts: 3,
            ai_retry_base_delay_ms: 1000,
            ai_retry_max_delay_ms: 8000,
            sender_name: "Alex".to_string(),
            sender_company: "Northwind Automation".to_string(),
            sender_offer: "AI automation that answers leads in under a minute".to_string(),
            ghl_api_key: None,
            ghl_location_id: None,
            ghl_pipeline_id: None,
            ghl_calendar_id: None,
            ghl_stage_ids: HashMap::new(),
            ghl_base_url: "https://services.leadconnectorhq.com".to_string(),
            instantly_api_key: None,
            instantly_campaign_ids: Vec::new(),
            instantly_base_url: "https://api.instantly.ai/api/v2".to_string(),
            hubspot_token: None,
            hubspot_base_url: "https://api.hubapi.com".to_string(),
            calcom_api_key: None,
            calcom_event_type_id: None,
            calcom_base_url: "https://api.cal.com/v1".to_string(),
            apify_token: None,
            apify_base_url: "https://api.apify.com/v2".to_string(),
            apify_google_maps_actor: "compass~crawler-google-places".to_string(),
            apify_linkedin_actor: "curious_coder~linkedin-profile-scraper".to_string(),
            slack_webhook_url: None,
            metrics_cache_ttl_secs: 300,
            metrics_report_interval_secs: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let ghl_api_key = optional_var("GHL_API_KEY");
        let ghl_location_id = optional_var("GHL_LOCATION_ID");
        if ghl_api_key.is_some() != ghl_location_id.is_some() {
            anyhow::bail!("GHL_API_KEY and GHL_LOCATION_ID must be set together");
        }

        let mut ghl_stage_ids = HashMap::new();
        for stage in OpportunityStage::ALL {
            if let Some(id) = optional_var(&format!("GHL_STAGE_{}", stage.env_key())) {
                ghl_stage_ids.insert(stage, id);
            }
        }

        let config = Self {
            port: parsed_var("PORT", defaults.port)?,
            webhook_secret: optional_var("WEBHOOK_SECRET"),

            openai_api_key: optional_var("OPENAI_API_KEY"),
            openai_model: optional_var("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            openai_base_url: url_var("OPENAI_BASE_URL", defaults.openai_base_url)?,
            ai_max_requests_per_minute: parsed_var(
                "AI_MAX_REQUESTS_PER_MINUTE",
                defaults.ai_max_requests_per_minute,
            )?,
            ai_retry_max_attempts: parsed_var("AI_RETRY_MAX_ATTEMPTS", defaults.ai_retry_max_attempts)?,
            ai_retry_base_delay_ms: parsed_var(
                "AI_RETRY_BASE_DELAY_MS",
                defaults.ai_retry_base_delay_ms,
            )?,
            ai_retry_max_delay_ms: parsed_var("AI_RETRY_MAX_DELAY_MS", defaults.ai_retry_max_delay_ms)?,

            sender_name: optional_var("SENDER_NAME").unwrap_or(defaults.sender_name),
            sender_company: optional_var("SENDER_COMPANY").unwrap_or(defaults.sender_company),
            sender_offer: optional_var("SENDER_OFFER").unwrap_or(defaults.sender_offer),

            ghl_api_key,
            ghl_location_id,
            ghl_pipeline_id: optional_var("GHL_PIPELINE_ID"),
            ghl_calendar_id: optional_var("GHL_CALENDAR_ID"),
            ghl_stage_ids,
            ghl_base_url: url_var("GHL_BASE_URL", defaults.ghl_base_url)?,

            instantly_api_key: optional_var("INSTANTLY_API_KEY"),
            instantly_campaign_ids: optional_var("INSTANTLY_CAMPAIGN_IDS")
                .map(|ids| parse_list(&ids))
                .unwrap_or_default(),
            instantly_base_url: url_var("INSTANTLY_BASE_URL", defaults.instantly_base_url)?,

            hubspot_token: optional_var("HUBSPOT_TOKEN"),
            hubspot_base_url: url_var("HUBSPOT_BASE_URL", defaults.hubspot_base_url)?,

            calcom_api_key: optional_var("CALCOM_API_KEY"),
            calcom_event_type_id: optional_var("CALCOM_EVENT_TYPE_ID")
                .map(|v| {
                    v.parse()
                        .map_err(|_| anyhow::anyhow!("CALCOM_EVENT_TYPE_ID must be an integer"))
                })
                .transpose()?,
            calcom_base_url: url_var("CALCOM_BASE_URL", defaults.calcom_base_url)?,

            apify_token: optional_var("APIFY_TOKEN"),
            apify_base_url: url_var("APIFY_BASE_URL", defaults.apify_base_url)?,
            apify_google_maps_actor: optional_var("APIFY_GOOGLE_MAPS_ACTOR")
                .unwrap_or(defaults.apify_google_maps_actor),
            apify_linkedin_actor: optional_var("APIFY_LINKEDIN_ACTOR")
                .unwrap_or(defaults.apify_linkedin_actor),

            slack_webhook_url: optional_var("SLACK_WEBHOOK_URL")
                .map(|url| validate_url("SLACK_WEBHOOK_URL", url))
                .transpose()?,

            metrics_cache_ttl_secs: parsed_var(
                "METRICS_CACHE_TTL_SECS",
                defaults.metrics_cache_ttl_secs,
            )?,
            metrics_report_interval_secs: optional_var("METRICS_REPORT_INTERVAL_SECS")
                .map(|v| {
                    v.parse().map_err(|_| {
                        anyhow::anyhow!("METRICS_REPORT_INTERVAL_SECS must be a number of seconds")
                    })
                })
                .transpose()?,
        };

        config.validate()?;

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Server Port: {}", config.port);
        tracing::debug!(
            "Integrations: openai={} ghl={} instantly={} hubspot={} calcom={} apify={} slack={}",
            config.openai_api_key.is_some(),
            config.ghl_api_key.is_some(),
            config.instantly_api_key.is_some(),
            config.hubspot_token.is_some(),
            config.calcom_api_key.is_some(),
            config.apify_token.is_some(),
            config.slack_webhook_url.is_some()
        );
        if config.webhook_secret.is_none() {
            tracing::warn!("WEBHOOK_SECRET not set - inbound webhooks are unauthenticated");
        }

        Ok(config)
    }

    /// Range checks on numeric settings that would otherwise panic deep inside tokio or moka.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ai_retry_max_attempts == 0 {
            anyhow::bail!("AI_RETRY_MAX_ATTEMPTS must be at least 1");
        }
        if self.metrics_report_interval_secs == Some(0) {
            anyhow::bail!("METRICS_REPORT_INTERVAL_SECS must be greater than 0");
        }
        if self.metrics_cache_ttl_secs > MAX_METRICS_CACHE_TTL_SECS {
            anyhow::bail!(
                "METRICS_CACHE_TTL_SECS must be at most {} (one day), got {}",
                MAX_METRICS_CACHE_TTL_SECS,
                self.metrics_cache_ttl_secs
            );
        }
        Ok(())
    }

    /// Backoff settings for AI generation calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.ai_retry_max_attempts,
            base_delay: Duration::from_millis(self.ai_retry_base_delay_ms),
            max_delay: Duration::from_millis(self.ai_retry_max_delay_ms),
        }
    }

    /// Per-minute request ceiling for AI generation calls.
    pub fn rate_limit(&self) -> RateLimit {
        RateLimit {
            max_requests: self.ai_max_requests_per_minute,
            window: Duration::from_secs(60),
        }
    }

    pub fn metrics_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.metrics_cache_ttl_secs)
    }
}

/// Reads a variable, treating empty and whitespace-only values as unset.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match optional_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", name, raw)),
        None => Ok(default),
    }
}

fn url_var(name: &str, default: String) -> anyhow::Result<String> {
    validate_url(name, optional_var(name).unwrap_or(default))
}

fn validate_url(name: &str, url: String) -> anyhow::Result<String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    url::Url::parse(&url).map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    Ok(url.trim_end_matches('/').to_string())
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
