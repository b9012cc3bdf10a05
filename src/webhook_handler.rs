use crate::errors::AppError;
use crate::fingerprint::event_fingerprint;
use crate::handlers::AppState;
use crate::models::{Booking, BookingStatus, OpportunityStage};
use crate::pipeline::{self, StageChange};
use crate::webhook_models::{ApifyWebhook, CalcomWebhook, InstantlyWebhook, WebhookResponse};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

type WebhookResult = Result<(StatusCode, Json<WebhookResponse>), AppError>;

/// Apify run webhook
///
/// On `ACTOR.RUN.SUCCEEDED` the run's default dataset is ingested in the
/// background (CRM sync plus outreach) and a summary goes to Slack. Other
/// run events are acknowledged and ignored.
pub async fn apify_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    validate_webhook_secret(&state, &headers)?;
    let hook: ApifyWebhook = parse_body(&body)?;
    tracing::info!("Received Apify webhook: {}", hook.event_type);

    if !hook.succeeded() {
        return Ok(ignored(&hook.event_type));
    }
    let dataset_id = hook
        .dataset_id()
        .ok_or_else(|| AppError::BadRequest("Missing resource.defaultDatasetId".to_string()))?
        .to_string();
    state.require_apify()?;

    if !first_delivery(&state, "apify", &body).await {
        return Ok(duplicate(&hook.event_type));
    }

    spawn_ingestion(state.clone(), dataset_id.clone());

    Ok((
        StatusCode::ACCEPTED,
        Json(
            WebhookResponse::new("accepted", &hook.event_type)
                .with_detail(serde_json::json!({ "dataset_id": dataset_id })),
        ),
    ))
}

/// Instantly webhook
///
/// A `reply_received` event moves the prospect to Replied (with the reply
/// snippet as a contact note) and alerts Slack.
pub async fn instantly_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    validate_webhook_secret(&state, &headers)?;
    let hook: InstantlyWebhook = parse_body(&body)?;
    tracing::info!("Received Instantly webhook: {}", hook.event_type);

    if !hook.is_reply() {
        return Ok(ignored(&hook.event_type));
    }
    let lead = hook
        .lead()
        .ok_or_else(|| AppError::BadRequest("Reply event without lead_email".to_string()))?;

    if !first_delivery(&state, "instantly", &body).await {
        return Ok(duplicate(&hook.event_type));
    }

    let snippet = hook
        .reply_text_snippet
        .clone()
        .unwrap_or_else(|| "(no preview)".to_string());

    let change = if state.ghl.is_some() {
        let note = format!(
            "💬 Replied to campaign {}:\n\n{}",
            hook.campaign_name
                .as_deref()
                .or(hook.campaign_id.as_deref())
                .unwrap_or("unknown"),
            snippet
        );
        match pipeline::advance_contact(&state, &lead, OpportunityStage::Replied, Some(&note)).await
        {
            Ok(change) => Some(change),
            Err(e) => {
                forget_delivery(&state, "instantly", &body).await;
                return Err(e);
            }
        }
    } else {
        None
    };

    notify_slack(
        &state,
        &format!(
            "💬 *New reply* from {} ({})\n> {}",
            lead.name,
            lead.email.as_deref().unwrap_or_default(),
            snippet
        ),
    )
    .await;

    Ok((
        StatusCode::OK,
        Json(WebhookResponse::new("processed", &hook.event_type).with_detail(change)),
    ))
}

/// Cal.com webhook
///
/// Created and rescheduled bookings move the attendee to Booked, mirror the
/// call into the GoHighLevel calendar when one is configured and text the
/// attendee a confirmation. Cancellations and no-shows are noted on the
/// contact. Every recognized event is posted to Slack.
pub async fn calendar_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    validate_webhook_secret(&state, &headers)?;
    let hook: CalcomWebhook = parse_body(&body)?;
    tracing::info!("Received Cal.com webhook: {}", hook.trigger_event);

    let Some(booking) = hook.booking() else {
        return Ok(ignored(&hook.trigger_event));
    };

    if !first_delivery(&state, "calendar", &body).await {
        return Ok(duplicate(&hook.trigger_event));
    }

    let change = match sync_booking(&state, &booking).await {
        Ok(change) => change,
        Err(e) => {
            forget_delivery(&state, "calendar", &body).await;
            return Err(e);
        }
    };

    notify_slack(&state, &booking_alert(&booking)).await;

    Ok((
        StatusCode::OK,
        Json(WebhookResponse::new("processed", &hook.trigger_event).with_detail(change)),
    ))
}

async fn sync_booking(state: &AppState, booking: &Booking) -> Result<Option<StageChange>, AppError> {
    let (Some(ghl), Some(lead)) = (&state.ghl, booking.attendee_lead()) else {
        return Ok(None);
    };
    let when = booking.start.format("%Y-%m-%d %H:%M UTC");

    match booking.status {
        BookingStatus::Confirmed | BookingStatus::Rescheduled => {
            let verb = if booking.status == BookingStatus::Confirmed {
                "booked"
            } else {
                "rescheduled"
            };
            let note = format!("📅 Discovery call {} for {}", verb, when);
            let change =
                pipeline::advance_contact(state, &lead, OpportunityStage::Booked, Some(&note))
                    .await?;
            let contact_id = change.contact_id();

            if let (Some(calendar_id), Some(end)) = (&state.config.ghl_calendar_id, booking.end) {
                let title = booking.title.as_deref().unwrap_or("Discovery call");
                if let Err(e) = ghl
                    .create_appointment(calendar_id, contact_id, booking.start, end, title)
                    .await
                {
                    tracing::warn!("Failed to mirror booking {} to GoHighLevel: {}", booking.uid, e);
                }
            }

            if lead.phone.is_some() {
                let message = format!(
                    "Hi {}, your call with {} is {} for {}. Reply here if you need to change it.",
                    lead.first_name(),
                    state.config.sender_company,
                    verb,
                    when
                );
                if let Err(e) = ghl.send_sms(contact_id, &message).await {
                    tracing::warn!("Failed to send booking SMS to {}: {}", lead.name, e);
                }
            }

            Ok(Some(change))
        }
        BookingStatus::Cancelled | BookingStatus::NoShow => {
            let contact_id = ghl.upsert_contact(&lead).await?;
            let note = if booking.status == BookingStatus::Cancelled {
                format!("❌ Call for {} cancelled", when)
            } else {
                format!("👻 No-show for the {} call", when)
            };
            ghl.add_note(&contact_id, &note).await?;
            Ok(None)
        }
    }
}

fn booking_alert(booking: &Booking) -> String {
    let who = booking
        .attendee_name
        .as_deref()
        .or(booking.attendee_email.as_deref())
        .unwrap_or("Unknown attendee");
    let when = booking.start.format("%a %b %-d, %H:%M UTC");

    match booking.status {
        BookingStatus::Confirmed => format!("📅 *New call booked* with {} on {}", who, when),
        BookingStatus::Rescheduled => format!("🔁 *Call rescheduled* with {} to {}", who, when),
        BookingStatus::Cancelled => format!("❌ *Call cancelled* by {} ({})", who, when),
        BookingStatus::NoShow => format!("👻 *No-show*: {} missed the {} call", who, when),
    }
}

fn spawn_ingestion(state: Arc<AppState>, dataset_id: String) {
    tokio::spawn(async move {
        match pipeline::ingest_dataset(&state, &dataset_id).await {
            Ok(summary) => {
                notify_slack(
                    &state,
                    &format!(
                        "📥 *Scrape ingested* ({}): {} items, {} leads accepted, {} queued for outreach, {} failures",
                        summary.dataset_id,
                        summary.items,
                        summary.accepted,
                        summary.outreach_queued,
                        summary.failures
                    ),
                )
                .await;
            }
            Err(e) => {
                tracing::error!("Failed to ingest dataset {}: {}", dataset_id, e);
                if let Some(slack) = &state.slack {
                    if let Err(e) = slack
                        .notify_error("Apify ingestion", &e.to_string())
                        .await
                    {
                        tracing::warn!("Failed to send Slack alert: {}", e);
                    }
                }
            }
        }
    });
}

/// Best-effort Slack message.
async fn notify_slack(state: &AppState, text: &str) {
    if let Some(slack) = &state.slack {
        if let Err(e) = slack.send(text, None).await {
            tracing::warn!("Failed to send Slack alert: {}", e);
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {}", e)))
}

fn ignored(event: &str) -> (StatusCode, Json<WebhookResponse>) {
    tracing::debug!("Ignoring webhook event {}", event);
    (StatusCode::OK, Json(WebhookResponse::new("ignored", event)))
}

fn duplicate(event: &str) -> (StatusCode, Json<WebhookResponse>) {
    tracing::debug!("Skipped duplicate webhook event {}", event);
    (StatusCode::OK, Json(WebhookResponse::duplicate(event)))
}

/// Records the delivery; false if the same body was seen within the dedup TTL.
async fn first_delivery(state: &AppState, source: &str, body: &[u8]) -> bool {
    state
        .webhook_dedup_cache
        .entry(event_fingerprint(source, body))
        .or_insert(())
        .await
        .is_fresh()
}

/// Lets the sender's retry through after a failed delivery.
async fn forget_delivery(state: &AppState, source: &str, body: &[u8]) {
    state
        .webhook_dedup_cache
        .invalidate(&event_fingerprint(source, body))
        .await;
}

const TOKEN_HEADER: &str = "X-Webhook-Token";

/// Checks the shared-secret header. Open when `WEBHOOK_SECRET` is unset.
fn validate_webhook_secret(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(secret) = state.config.webhook_secret.as_deref() else {
        return Ok(());
    };

    match headers.get(TOKEN_HEADER).map(|v| v.to_str()) {
        Some(Ok(token)) if constant_time_compare(token, secret) => Ok(()),
        Some(_) => {
            tracing::warn!("🔒 Rejected webhook with a bad {}", TOKEN_HEADER);
            Err(AppError::Unauthorized(format!("Invalid {}", TOKEN_HEADER)))
        }
        None => Err(AppError::Unauthorized(format!("Missing {}", TOKEN_HEADER))),
    }
}

/// Byte comparison whose duration does not depend on where the inputs differ.
fn constant_time_compare(provided: &str, expected: &str) -> bool {
    let (provided, expected) = (provided.as_bytes(), expected.as_bytes());
    if provided.len() != expected.len() {
        return false;
    }

    let diff = provided
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}
