use crate::config::Config;
use crate::email_generation::{EmailGenerator, GeneratedEmails, SenderProfile};
use crate::errors::AppError;
use crate::integrations::apify::{ActorRun, ApifyClient, ScrapeRequest};
use crate::integrations::calendar::{BookingRequest, CalendarClient};
use crate::integrations::gohighlevel::GhlClient;
use crate::integrations::hubspot::HubSpotClient;
use crate::integrations::instantly::InstantlyClient;
use crate::integrations::openai::OpenAiClient;
use crate::integrations::slack::SlackNotifier;
use crate::metrics::{MetricsCollector, MetricsSnapshot, MetricsSources};
use crate::models::{Approach, Booking, EmailVariant, Lead};
use crate::pricing::{
    calculate_discount, calculate_package_price, example_configurations, format_proposal,
    generate_proposal, Discount, DiscountResult, Multiplier, Package, PackagePrice, PriceOptions,
    Proposal, ProposalRequest,
};
use crate::resilience::{Outcome, ResilientCaller};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state injected into handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    pub ghl: Option<GhlClient>,
    pub instantly: Option<InstantlyClient>,
    pub hubspot: Option<HubSpotClient>,
    pub calendar: Option<CalendarClient>,
    pub apify: Option<ApifyClient>,
    pub slack: Option<SlackNotifier>,
    /// Present when `OPENAI_API_KEY` is set.
    pub email_generator: Option<EmailGenerator>,
    pub metrics: MetricsCollector,
    /// Webhook body fingerprints seen in the last 5 minutes.
    pub webhook_dedup_cache: Cache<String, ()>,
}

impl AppState {
    /// Builds a client for every integration that has credentials.
    pub fn from_config(config: Config) -> Result<Self, AppError> {
        config
            .validate()
            .map_err(|e| AppError::InternalError(e.to_string()))?;

        let ghl = match (&config.ghl_api_key, &config.ghl_location_id) {
            (Some(key), Some(location)) => Some(GhlClient::new(
                &config.ghl_base_url,
                key,
                location,
                config.ghl_pipeline_id.clone(),
            )?),
            _ => None,
        };

        let instantly = config
            .instantly_api_key
            .as_deref()
            .map(|key| InstantlyClient::new(&config.instantly_base_url, key))
            .transpose()?;

        let hubspot = config
            .hubspot_token
            .as_deref()
            .map(|token| HubSpotClient::new(&config.hubspot_base_url, token))
            .transpose()?;

        let calendar = config
            .calcom_api_key
            .as_deref()
            .map(|key| CalendarClient::new(&config.calcom_base_url, key, config.calcom_event_type_id))
            .transpose()?;

        let apify = config
            .apify_token
            .as_deref()
            .map(|token| {
                ApifyClient::new(
                    &config.apify_base_url,
                    token,
                    &config.apify_google_maps_actor,
                    &config.apify_linkedin_actor,
                )
            })
            .transpose()?;

        let slack = config
            .slack_webhook_url
            .as_deref()
            .map(SlackNotifier::new)
            .transpose()?;

        let email_generator = config
            .openai_api_key
            .as_deref()
            .map(|key| -> Result<EmailGenerator, AppError> {
                let openai = OpenAiClient::new(&config.openai_base_url, key, &config.openai_model)?;
                Ok(EmailGenerator::new(
                    openai,
                    ResilientCaller::new(config.rate_limit(), config.retry_policy()),
                    SenderProfile::from_config(&config),
                ))
            })
            .transpose()?;

        let metrics = MetricsCollector::new(
            MetricsSources {
                ghl: ghl.clone(),
                stage_ids: config.ghl_stage_ids.clone(),
                instantly: instantly.clone(),
                campaign_ids: config.instantly_campaign_ids.clone(),
                calendar: calendar.clone(),
            },
            slack.clone(),
            config.metrics_cache_ttl(),
        );

        let webhook_dedup_cache = Cache::builder()
            .time_to_live(Duration::from_secs(300))
            .max_capacity(10_000)
            .build();

        Ok(Self {
            config,
            ghl,
            instantly,
            hubspot,
            calendar,
            apify,
            slack,
            email_generator,
            metrics,
            webhook_dedup_cache,
        })
    }

    pub fn require_ghl(&self) -> Result<&GhlClient, AppError> {
        self.ghl
            .as_ref()
            .ok_or_else(|| AppError::NotConfigured("GHL_API_KEY".to_string()))
    }

    pub fn require_apify(&self) -> Result<&ApifyClient, AppError> {
        self.apify
            .as_ref()
            .ok_or_else(|| AppError::NotConfigured("APIFY_TOKEN".to_string()))
    }

    pub fn require_calendar(&self) -> Result<&CalendarClient, AppError> {
        self.calendar
            .as_ref()
            .ok_or_else(|| AppError::NotConfigured("CALCOM_API_KEY".to_string()))
    }

    pub fn require_email_generator(&self) -> Result<&EmailGenerator, AppError> {
        self.email_generator
            .as_ref()
            .ok_or_else(|| AppError::NotConfigured("OPENAI_API_KEY".to_string()))
    }
}

/// Health check endpoint.
///
/// Returns the service status, version and which integrations are enabled.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "agency-ops",
            "version": env!("CARGO_PKG_VERSION"),
            "integrations": {
                "openai": state.email_generator.is_some(),
                "gohighlevel": state.ghl.is_some(),
                "instantly": state.instantly.is_some(),
                "hubspot": state.hubspot.is_some(),
                "calcom": state.calendar.is_some(),
                "apify": state.apify.is_some(),
                "slack": state.slack.is_some(),
            }
        })),
    )
}

// ============ Pricing ============

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub package: String,
    #[serde(default)]
    pub multipliers: Vec<String>,
    #[serde(default)]
    pub discount: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub price: PackagePrice,
    pub discount: Option<DiscountResult>,
}

/// Proposal input with package, multiplier and discount given by name.
#[derive(Debug, Deserialize)]
pub struct ProposalBody {
    pub client_name: String,
    pub package: String,
    #[serde(default)]
    pub multipliers: Vec<String>,
    #[serde(default)]
    pub discount: Option<String>,
    #[serde(default)]
    pub hours_saved_per_month: Option<u32>,
    #[serde(default)]
    pub hourly_value: Option<u32>,
}

impl ProposalBody {
    fn into_request(self) -> Result<ProposalRequest, AppError> {
        Ok(ProposalRequest {
            client_name: self.client_name,
            package: Package::from_str(&self.package)?,
            multipliers: parse_multipliers(&self.multipliers)?,
            discount: self.discount.as_deref().map(Discount::from_str).transpose()?,
            hours_saved_per_month: self.hours_saved_per_month,
            hourly_value: self.hourly_value,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ProposalResponse {
    pub proposal: Proposal,
    pub markdown: String,
}

fn parse_multipliers(names: &[String]) -> Result<Vec<Multiplier>, AppError> {
    names.iter().map(|name| Multiplier::from_str(name)).collect()
}

/// POST /api/v1/pricing/quote
pub async fn pricing_quote(Json(request): Json<QuoteRequest>) -> Result<Json<QuoteResponse>, AppError> {
    let package = Package::from_str(&request.package)?;
    let options = PriceOptions {
        multipliers: parse_multipliers(&request.multipliers)?,
    };
    let discount = request.discount.as_deref().map(Discount::from_str).transpose()?;

    let price = calculate_package_price(package, &options);
    let discount = discount.map(|d| calculate_discount(&price.monthly_fee, d));

    Ok(Json(QuoteResponse { price, discount }))
}

/// POST /api/v1/pricing/proposal
pub async fn pricing_proposal(
    Json(body): Json<ProposalBody>,
) -> Result<Json<ProposalResponse>, AppError> {
    let proposal = generate_proposal(&body.into_request()?)?;
    tracing::info!("Proposal {} generated for {}", proposal.id, proposal.client_name);

    let markdown = format_proposal(&proposal);
    Ok(Json(ProposalResponse { proposal, markdown }))
}

/// GET /api/v1/pricing/examples
pub async fn pricing_examples() -> Result<Json<Vec<ProposalResponse>>, AppError> {
    let proposals = example_configurations()
        .iter()
        .map(|request| {
            let proposal = generate_proposal(request)?;
            let markdown = format_proposal(&proposal);
            Ok(ProposalResponse { proposal, markdown })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    Ok(Json(proposals))
}

// ============ Outreach ============

#[derive(Debug, Deserialize)]
pub struct GenerateEmailsRequest {
    pub lead: Lead,
    /// One approach, or all three when omitted.
    #[serde(default)]
    pub approach: Option<Approach>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum GenerateEmailsResponse {
    Single(Outcome<EmailVariant>),
    All(GeneratedEmails),
}

/// POST /api/v1/emails/generate
///
/// Always returns copy: variants that could not be generated come back as
/// `{"kind": "fallback"}` templates.
pub async fn generate_emails(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateEmailsRequest>,
) -> Result<Json<GenerateEmailsResponse>, AppError> {
    let generator = state.require_email_generator()?;

    let mut lead = request.lead;
    lead.name = lead.name.trim().to_string();
    if lead.name.is_empty() {
        return Err(AppError::BadRequest("Lead name is required".to_string()));
    }
    lead.rescore();

    let response = match request.approach {
        Some(approach) => GenerateEmailsResponse::Single(generator.generate(&lead, approach).await),
        None => GenerateEmailsResponse::All(generator.generate_all(&lead).await),
    };
    Ok(Json(response))
}

/// POST /api/v1/scrapes
pub async fn start_scrape(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScrapeRequest>,
) -> Result<(StatusCode, Json<ActorRun>), AppError> {
    let apify = state.require_apify()?;
    let run = apify.start_actor(&request).await?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

// ============ Bookings ============

/// POST /api/v1/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let calendar = state.require_calendar()?;
    let booking = calendar.create_booking(&request).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

#[derive(Debug, Deserialize)]
pub struct CancelParams {
    #[serde(default)]
    pub reason: Option<String>,
}

/// DELETE /api/v1/bookings/:id
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<CancelParams>,
) -> Result<StatusCode, AppError> {
    let calendar = state.require_calendar()?;
    calendar.cancel_booking(&id, params.reason.as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Metrics ============

#[derive(Debug, Default, Deserialize)]
pub struct MetricsParams {
    #[serde(default)]
    pub refresh: bool,
}

/// GET /api/v1/metrics
pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MetricsParams>,
) -> Json<MetricsSnapshot> {
    let snapshot = if params.refresh {
        state.metrics.refresh().await
    } else {
        state.metrics.collect().await
    };
    Json(snapshot.as_ref().clone())
}

/// POST /api/v1/metrics/report
pub async fn send_metrics_report(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MetricsSnapshot>, AppError> {
    let snapshot = state.metrics.report().await?;
    Ok(Json(snapshot.as_ref().clone()))
}
