/// Integration tests with mocked external APIs
/// Exercises the integration clients and the flows built on them without
/// hitting real services
use agency_ops::config::Config;
use agency_ops::email_generation::{EmailGenerator, SenderProfile};
use agency_ops::errors::AppError;
use agency_ops::handlers::AppState;
use agency_ops::integrations::calendar::{BookingRequest, CalendarClient};
use agency_ops::integrations::gohighlevel::GhlClient;
use agency_ops::integrations::hubspot::HubSpotClient;
use agency_ops::integrations::instantly::InstantlyClient;
use agency_ops::integrations::openai::OpenAiClient;
use agency_ops::integrations::slack::SlackNotifier;
use agency_ops::metrics::{MetricsCollector, MetricsSources};
use agency_ops::models::{Approach, Lead, LeadSource, OpportunityStage, Vertical};
use agency_ops::pipeline::{self, StageChange};
use agency_ops::resilience::{Outcome, RateLimit, ResilientCaller, RetryPolicy};
use agency_ops::routes::build_router;
use agency_ops::validation::is_valid_email_variant;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_caller() -> ResilientCaller {
    ResilientCaller::new(
        RateLimit {
            max_requests: 100,
            window: Duration::from_secs(60),
        },
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        },
    )
}

fn generator(server: &MockServer) -> EmailGenerator {
    let openai = OpenAiClient::new(&server.uri(), "sk-test", "gpt-4o-mini").unwrap();
    EmailGenerator::new(openai, fast_caller(), SenderProfile::default())
}

fn chat_reply(content: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content.to_string() }
        }],
        "usage": { "prompt_tokens": 220, "completion_tokens": 180, "total_tokens": 400 }
    }))
}

fn valid_email_json() -> serde_json::Value {
    json!({
        "subject": "A faster reply for Bright Smile patients",
        "body": format!("Hi Dana, {}\n\nBest, Alex", "we help practices answer every enquiry quickly. ".repeat(12)),
    })
}

fn dental_lead() -> Lead {
    let mut lead = Lead::new("Dana Whitfield", LeadSource::GoogleMaps);
    lead.email = Some("dana@brightsmile.com".into());
    lead.company = Some("Bright Smile Dental".into());
    lead.vertical = Vertical::Dental;
    lead.rescore();
    lead
}

fn ghl_config(server: &MockServer) -> Config {
    let mut stage_ids = HashMap::new();
    stage_ids.insert(OpportunityStage::Lead, "stg-lead".to_string());
    stage_ids.insert(OpportunityStage::Replied, "stg-replied".to_string());
    stage_ids.insert(OpportunityStage::Booked, "stg-booked".to_string());

    Config {
        ghl_api_key: Some("ghl-key".to_string()),
        ghl_location_id: Some("loc-1".to_string()),
        ghl_pipeline_id: Some("pipe-1".to_string()),
        ghl_stage_ids: stage_ids,
        ghl_base_url: server.uri(),
        ..Config::default()
    }
}

async fn mount_contact_upsert(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/contacts/upsert"))
        .and(header("authorization", "Bearer ghl-key"))
        .and(header("Version", "2021-07-28"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "contact": { "id": "contact-1" } })),
        )
        .mount(server)
        .await;
}

// ============ Email generation ============

#[tokio::test]
async fn test_generated_variant_is_tagged_generated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "response_format": { "type": "json_object" } })))
        .respond_with(chat_reply(valid_email_json()))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = generator(&server)
        .generate(&dental_lead(), Approach::ProblemSolution)
        .await;

    assert!(!outcome.is_fallback());
    assert_eq!(outcome.value().subject, "A faster reply for Bright Smile patients");
    assert!(is_valid_email_variant(outcome.value()));
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(chat_reply(valid_email_json()))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = generator(&server)
        .generate(&dental_lead(), Approach::Question)
        .await;

    assert!(matches!(outcome, Outcome::Generated { .. }));
}

#[tokio::test]
async fn test_invalid_replies_exhaust_into_fallback() {
    let server = MockServer::start().await;
    // Too short to pass validation on every attempt
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(chat_reply(json!({ "subject": "Hi", "body": "Sorry, I cannot help." })))
        .expect(3)
        .mount(&server)
        .await;

    let lead = dental_lead();
    let outcome = generator(&server)
        .generate(&lead, Approach::SocialProof)
        .await;

    match &outcome {
        Outcome::Fallback { value, reason } => {
            assert!(is_valid_email_variant(value));
            assert!(value.body.starts_with("Hi Dana,"));
            assert!(reason.contains("gave up after 3 attempt(s)"));
            assert!(reason.contains("failed email validation"));
        }
        other => panic!("expected fallback, got {:?}", other),
    }
}

#[tokio::test]
async fn test_generate_all_counts_fallbacks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "bad key" })))
        .mount(&server)
        .await;

    let emails = generator(&server).generate_all(&dental_lead()).await;

    assert_eq!(emails.variants.len(), 3);
    assert_eq!(emails.fallback_count, 3);

    let tagged = serde_json::to_value(&emails.variants[0]).unwrap();
    assert_eq!(tagged["kind"], "fallback");
    assert_eq!(tagged["value"]["approach"], "problem_solution");
}

// ============ GoHighLevel pipeline ============

#[tokio::test]
async fn test_advance_creates_missing_opportunity() {
    let server = MockServer::start().await;
    mount_contact_upsert(&server).await;
    Mock::given(method("GET"))
        .and(path("/opportunities/search"))
        .and(query_param("contact_id", "contact-1"))
        .and(query_param("pipeline_id", "pipe-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "opportunities": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/opportunities/upsert"))
        .and(body_partial_json(json!({
            "pipelineStageId": "stg-lead",
            "contactId": "contact-1",
            "name": "Bright Smile Dental (Dana Whitfield)"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "opportunity": { "id": "opp-1" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let state = AppState::from_config(ghl_config(&server)).unwrap();
    let change = pipeline::advance_contact(&state, &dental_lead(), OpportunityStage::Lead, None)
        .await
        .unwrap();

    assert_eq!(
        change,
        StageChange::Created {
            contact_id: "contact-1".into(),
            opportunity_id: "opp-1".into(),
            stage: OpportunityStage::Lead,
        }
    );
}

#[tokio::test]
async fn test_advance_moves_forward_with_note() {
    let server = MockServer::start().await;
    mount_contact_upsert(&server).await;
    Mock::given(method("POST"))
        .and(path("/contacts/contact-1/notes"))
        .and(body_partial_json(json!({ "body": "Interested, send times" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "note": { "id": "n1" } })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/opportunities/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "opportunities": [{ "id": "opp-1", "pipelineStageId": "stg-lead", "status": "open" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/opportunities/upsert"))
        .and(body_partial_json(json!({ "pipelineStageId": "stg-replied" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "opportunity": { "id": "opp-1" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let state = AppState::from_config(ghl_config(&server)).unwrap();
    let change = pipeline::advance_contact(
        &state,
        &dental_lead(),
        OpportunityStage::Replied,
        Some("Interested, send times"),
    )
    .await
    .unwrap();

    assert!(matches!(
        change,
        StageChange::Moved {
            from: OpportunityStage::Lead,
            to: OpportunityStage::Replied,
            ..
        }
    ));
}

#[tokio::test]
async fn test_advance_never_moves_backwards() {
    let server = MockServer::start().await;
    mount_contact_upsert(&server).await;
    Mock::given(method("GET"))
        .and(path("/opportunities/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "opportunities": [{ "id": "opp-1", "pipelineStageId": "stg-booked" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/opportunities/upsert"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let state = AppState::from_config(ghl_config(&server)).unwrap();
    let change = pipeline::advance_contact(&state, &dental_lead(), OpportunityStage::Replied, None)
        .await
        .unwrap();

    match change {
        StageChange::Unchanged { contact_id, reason } => {
            assert_eq!(contact_id, "contact-1");
            assert_eq!(reason, "already at Booked");
        }
        other => panic!("expected no move, got {:?}", other),
    }
}

#[tokio::test]
async fn test_upstream_error_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contacts/upsert"))
        .respond_with(ResponseTemplate::new(422).set_body_string("invalid phone"))
        .mount(&server)
        .await;

    let ghl = GhlClient::new(&server.uri(), "ghl-key", "loc-1", None).unwrap();
    let err = ghl.upsert_contact(&dental_lead()).await.unwrap_err();

    let message = err.to_string();
    assert!(message.contains("GoHighLevel returned 422"));
    assert!(message.contains("invalid phone"));
}

// ============ Dataset ingestion ============

#[tokio::test]
async fn test_ingest_dataset_syncs_valid_leads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/datasets/ds-1/items"))
        .and(query_param("token", "apify-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "title": "Bright Smile Dental",
                "categoryName": "Dentist",
                "phone": "(650) 253-0000",
                "emails": ["info@brightsmile.com"],
                "website": "https://brightsmile.com"
            },
            { "categoryName": "Dentist" },
            { "fullName": "No Contact", "linkedinUrl": "https://linkedin.com/in/nocontact" }
        ])))
        .mount(&server)
        .await;
    mount_contact_upsert(&server).await;
    Mock::given(method("GET"))
        .and(path("/opportunities/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "opportunities": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/opportunities/upsert"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "opportunity": { "id": "opp-9" } })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/leads"))
        .and(header("authorization", "Bearer inst-key"))
        .and(body_partial_json(json!({
            "campaign": "camp-1",
            "email": "info@brightsmile.com",
            "company_name": "Bright Smile Dental"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "lead-1" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/contacts/search"))
        .and(header("authorization", "Bearer hs-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "total": 0, "results": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/contacts"))
        .and(body_partial_json(json!({
            "properties": { "email": "info@brightsmile.com", "company": "Bright Smile Dental" }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "hs-11" })))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config {
        apify_token: Some("apify-token".to_string()),
        apify_base_url: server.uri(),
        hubspot_token: Some("hs-token".to_string()),
        hubspot_base_url: server.uri(),
        instantly_api_key: Some("inst-key".to_string()),
        instantly_campaign_ids: vec!["camp-1".to_string()],
        instantly_base_url: server.uri(),
        ..ghl_config(&server)
    };
    let state = AppState::from_config(config).unwrap();

    let summary = pipeline::ingest_dataset(&state, "ds-1").await.unwrap();

    assert_eq!(summary.items, 3);
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.crm_synced, 1);
    assert_eq!(summary.outreach_queued, 1);
    assert_eq!(summary.failures, 0);
}

// ============ Metrics ============

#[tokio::test]
async fn test_concurrent_metrics_requests_share_one_upstream_round() {
    let server = MockServer::start().await;
    for (stage_id, total) in [("stg-lead", 42), ("stg-booked", 3)] {
        Mock::given(method("GET"))
            .and(path("/opportunities/search"))
            .and(query_param("pipeline_stage_id", stage_id))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "opportunities": [], "meta": { "total": total } }))
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/campaigns/analytics"))
        .and(query_param("id", "camp-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "campaign_id": "camp-1", "emails_sent_count": 200, "reply_count": 5, "bounced_count": 2 }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let mut stage_ids = HashMap::new();
    stage_ids.insert(OpportunityStage::Lead, "stg-lead".to_string());
    stage_ids.insert(OpportunityStage::Booked, "stg-booked".to_string());

    let collector = MetricsCollector::new(
        MetricsSources {
            ghl: Some(GhlClient::new(&server.uri(), "ghl-key", "loc-1", Some("pipe-1".into())).unwrap()),
            stage_ids,
            instantly: Some(InstantlyClient::new(&server.uri(), "inst-key").unwrap()),
            campaign_ids: vec!["camp-1".to_string()],
            calendar: None,
        },
        None,
        Duration::from_secs(300),
    );

    let (a, b, c) = tokio::join!(collector.collect(), collector.collect(), collector.collect());

    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(a.opportunities_by_stage.len(), 2);
    assert_eq!(a.opportunities_by_stage[0].stage, OpportunityStage::Lead);
    assert_eq!(a.opportunities_by_stage[0].count, 42);
    assert_eq!(a.opportunities_by_stage[1].count, 3);
    assert_eq!(a.emails_sent, 200);
    assert_eq!(a.replies, 5);
    assert!((a.reply_rate - 2.5).abs() < 1e-9);
    assert!(a.errors.is_empty());

    // Still cached: no further upstream calls (verified by expect(1) on drop)
    let again = collector.collect().await;
    assert_eq!(again.emails_sent, 200);
}

#[tokio::test]
async fn test_failing_metrics_source_is_reported_not_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/campaigns/analytics"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let collector = MetricsCollector::new(
        MetricsSources {
            instantly: Some(InstantlyClient::new(&server.uri(), "inst-key").unwrap()),
            campaign_ids: vec!["camp-1".to_string()],
            ..MetricsSources::default()
        },
        None,
        Duration::from_secs(300),
    );

    let snapshot = collector.collect().await;
    assert_eq!(snapshot.emails_sent, 0);
    assert_eq!(snapshot.errors.len(), 1);
    assert!(snapshot.errors[0].starts_with("Instantly campaign camp-1"));
}

// ============ Slack ============

#[tokio::test]
async fn test_metrics_report_posts_blocks_to_slack() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/T000/B000/XXX"))
        .and(body_partial_json(json!({
            "text": "Daily metrics: 0 emails sent, 0 replies (0.0%)"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let slack = SlackNotifier::new(&format!("{}/services/T000/B000/XXX", server.uri())).unwrap();
    let collector = MetricsCollector::new(
        MetricsSources::default(),
        Some(slack),
        Duration::from_secs(300),
    );

    let snapshot = collector.report().await.unwrap();
    assert!(snapshot.errors.is_empty());
}

// ============ HubSpot ============

#[tokio::test]
async fn test_hubspot_sync_reuses_existing_contact() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/contacts/search"))
        .and(header("authorization", "Bearer hs-token"))
        .and(body_partial_json(json!({
            "filterGroups": [{
                "filters": [{ "propertyName": "email", "operator": "EQ", "value": "dana@brightsmile.com" }]
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 1,
            "results": [{ "id": "hs-7", "properties": { "email": "dana@brightsmile.com" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/contacts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "hs-dup" })))
        .expect(0)
        .mount(&server)
        .await;

    let hubspot = HubSpotClient::new(&server.uri(), "hs-token").unwrap();
    let (id, created) = hubspot.sync_lead(&dental_lead()).await.unwrap();

    assert_eq!(id, "hs-7");
    assert!(!created);
}

#[tokio::test]
async fn test_hubspot_sync_creates_missing_contact() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/contacts/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "total": 0, "results": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/contacts"))
        .and(body_partial_json(json!({
            "properties": {
                "email": "dana@brightsmile.com",
                "firstname": "Dana",
                "lastname": "Whitfield",
                "company": "Bright Smile Dental",
                "hs_lead_status": "NEW"
            }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "hs-8" })))
        .expect(1)
        .mount(&server)
        .await;

    let hubspot = HubSpotClient::new(&server.uri(), "hs-token").unwrap();
    let (id, created) = hubspot.sync_lead(&dental_lead()).await.unwrap();

    assert_eq!(id, "hs-8");
    assert!(created);
}

// ============ Cal.com ============

fn calendar(server: &MockServer, event_type_id: Option<i64>) -> CalendarClient {
    CalendarClient::new(&server.uri(), "cal-key", event_type_id).unwrap()
}

#[tokio::test]
async fn test_create_booking_sends_api_key_and_event_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bookings"))
        .and(query_param("apiKey", "cal-key"))
        .and(body_partial_json(json!({
            "eventTypeId": 42,
            "timeZone": "America/Chicago",
            "responses": { "name": "Dana Whitfield", "email": "dana@brightsmile.com" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 901,
            "uid": "bk_901",
            "title": "Discovery call between Alex and Dana Whitfield",
            "startTime": "2026-11-03T15:00:00Z",
            "endTime": "2026-11-03T15:30:00Z",
            "status": "ACCEPTED"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = BookingRequest {
        name: "Dana Whitfield".to_string(),
        email: "dana@brightsmile.com".to_string(),
        start: Utc.with_ymd_and_hms(2026, 11, 3, 15, 0, 0).unwrap(),
        timezone: "America/Chicago".to_string(),
        notes: Some("Wants to automate recall reminders".to_string()),
    };
    let booking = calendar(&server, Some(42)).create_booking(&request).await.unwrap();

    assert_eq!(booking.uid, "bk_901");
    assert_eq!(booking.start, request.start);
    assert_eq!(booking.end, Some(Utc.with_ymd_and_hms(2026, 11, 3, 15, 30, 0).unwrap()));
    assert_eq!(booking.attendee_email.as_deref(), Some("dana@brightsmile.com"));
}

#[tokio::test]
async fn test_create_booking_without_event_type_is_not_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bookings"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let request = BookingRequest {
        name: "Dana Whitfield".to_string(),
        email: "dana@brightsmile.com".to_string(),
        start: Utc.with_ymd_and_hms(2026, 11, 3, 15, 0, 0).unwrap(),
        timezone: "America/New_York".to_string(),
        notes: None,
    };
    let err = calendar(&server, None).create_booking(&request).await.unwrap_err();

    assert!(matches!(err, AppError::NotConfigured(ref var) if var == "CALCOM_EVENT_TYPE_ID"));
}

#[tokio::test]
async fn test_cancel_booking_sends_reason() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/bookings/bk_901/cancel"))
        .and(query_param("apiKey", "cal-key"))
        .and(body_partial_json(json!({ "cancellationReason": "Client asked to reschedule" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "Booking successfully cancelled." })))
        .expect(1)
        .mount(&server)
        .await;

    calendar(&server, Some(42))
        .cancel_booking("bk_901", Some("Client asked to reschedule"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_upcoming_bookings_count_only_future_accepted() {
    let server = MockServer::start().await;
    let in_days = |days: i64| (Utc::now() + ChronoDuration::days(days)).to_rfc3339();
    Mock::given(method("GET"))
        .and(path("/bookings"))
        .and(query_param("apiKey", "cal-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bookings": [
                { "id": 1, "startTime": in_days(2), "status": "ACCEPTED" },
                { "id": 2, "startTime": in_days(5) },
                { "id": 3, "startTime": in_days(3), "status": "CANCELLED" },
                { "id": 4, "startTime": in_days(1), "status": "PENDING" },
                { "id": 5, "startTime": in_days(-2), "status": "ACCEPTED" }
            ]
        })))
        .mount(&server)
        .await;

    assert_eq!(calendar(&server, None).count_upcoming_bookings().await.unwrap(), 2);

    let collector = MetricsCollector::new(
        MetricsSources {
            calendar: Some(calendar(&server, None)),
            ..MetricsSources::default()
        },
        None,
        Duration::from_secs(300),
    );
    let snapshot = collector.collect().await;
    assert_eq!(snapshot.upcoming_bookings, Some(2));
    assert!(snapshot.errors.is_empty());
}

// ============ Webhook processing ============

async fn post_webhook(app: &Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn booking_created(phone: Option<&str>) -> Value {
    json!({
        "triggerEvent": "BOOKING_CREATED",
        "payload": {
            "uid": "bk_1",
            "title": "Discovery call",
            "startTime": "2026-11-03T15:00:00Z",
            "endTime": "2026-11-03T15:30:00Z",
            "attendees": [{
                "email": "dana@brightsmile.com",
                "name": "Dana Whitfield",
                "timeZone": "America/New_York",
                "phoneNumber": phone
            }]
        }
    })
}

async fn mount_opportunity_at(server: &MockServer, stage_id: &str) {
    Mock::given(method("GET"))
        .and(path("/opportunities/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "opportunities": [{ "id": "opp-1", "pipelineStageId": stage_id, "status": "open" }]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_instantly_reply_moves_contact_to_replied() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contacts/upsert"))
        .and(body_partial_json(json!({
            "locationId": "loc-1",
            "email": "dana@brightsmile.com",
            "companyName": "Bright Smile Dental"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "contact": { "id": "contact-1" } })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/contacts/contact-1/notes"))
        .and(body_partial_json(json!({
            "body": "💬 Replied to campaign Dental Q4:\n\nYes, Tuesday works"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "note": { "id": "n1" } })))
        .expect(1)
        .mount(&server)
        .await;
    mount_opportunity_at(&server, "stg-lead").await;
    Mock::given(method("POST"))
        .and(path("/opportunities/upsert"))
        .and(body_partial_json(json!({ "pipelineStageId": "stg-replied", "contactId": "contact-1" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "opportunity": { "id": "opp-1" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let app = build_router(Arc::new(AppState::from_config(ghl_config(&server)).unwrap()));
    let (status, body) = post_webhook(
        &app,
        "/api/v1/webhooks/instantly",
        &json!({
            "event_type": "reply_received",
            "lead_email": "Dana@BrightSmile.com",
            "campaign_name": "Dental Q4",
            "reply_text_snippet": "Yes, Tuesday works",
            "first_name": "Dana",
            "last_name": "Whitfield",
            "company_name": "Bright Smile Dental"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "processed");
    assert_eq!(body["duplicate"], false);
    assert_eq!(body["detail"]["change"], "moved");
    assert_eq!(body["detail"]["from"], "lead");
    assert_eq!(body["detail"]["to"], "replied");
}

#[tokio::test]
async fn test_calendar_booking_books_mirrors_and_texts() {
    let server = MockServer::start().await;
    mount_contact_upsert(&server).await;
    Mock::given(method("POST"))
        .and(path("/contacts/contact-1/notes"))
        .and(body_partial_json(json!({ "body": "📅 Discovery call booked for 2026-11-03 15:00 UTC" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "note": { "id": "n2" } })))
        .expect(1)
        .mount(&server)
        .await;
    mount_opportunity_at(&server, "stg-replied").await;
    Mock::given(method("POST"))
        .and(path("/opportunities/upsert"))
        .and(body_partial_json(json!({ "pipelineStageId": "stg-booked" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "opportunity": { "id": "opp-1" } })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/calendars/events/appointments"))
        .and(body_partial_json(json!({
            "calendarId": "ghl-cal-1",
            "locationId": "loc-1",
            "contactId": "contact-1",
            "title": "Discovery call",
            "appointmentStatus": "confirmed"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "appt-1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/conversations/messages"))
        .and(body_partial_json(json!({ "type": "SMS", "contactId": "contact-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messageId": "m-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config {
        ghl_calendar_id: Some("ghl-cal-1".to_string()),
        ..ghl_config(&server)
    };
    let app = build_router(Arc::new(AppState::from_config(config).unwrap()));
    let (status, body) = post_webhook(
        &app,
        "/api/v1/webhooks/calendar",
        &booking_created(Some("+16502530000")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "processed");
    assert_eq!(body["detail"]["change"], "moved");
    assert_eq!(body["detail"]["to"], "booked");
}

#[tokio::test]
async fn test_calendar_booking_without_phone_or_calendar_skips_extras() {
    let server = MockServer::start().await;
    mount_contact_upsert(&server).await;
    Mock::given(method("POST"))
        .and(path("/contacts/contact-1/notes"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "note": { "id": "n3" } })))
        .mount(&server)
        .await;
    mount_opportunity_at(&server, "stg-lead").await;
    Mock::given(method("POST"))
        .and(path("/opportunities/upsert"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "opportunity": { "id": "opp-1" } })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/calendars/events/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "appt-x" })))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/conversations/messages"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = build_router(Arc::new(AppState::from_config(ghl_config(&server)).unwrap()));
    let (status, body) = post_webhook(&app, "/api/v1/webhooks/calendar", &booking_created(None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detail"]["to"], "booked");
}

#[tokio::test]
async fn test_failed_delivery_is_processed_on_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contacts/upsert"))
        .respond_with(ResponseTemplate::new(500).set_body_string("temporarily unavailable"))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_contact_upsert(&server).await;
    Mock::given(method("POST"))
        .and(path("/contacts/contact-1/notes"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "note": { "id": "n4" } })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/opportunities/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "opportunities": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/opportunities/upsert"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "opportunity": { "id": "opp-2" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let app = build_router(Arc::new(AppState::from_config(ghl_config(&server)).unwrap()));
    let hook = booking_created(None);

    let (status, _) = post_webhook(&app, "/api/v1/webhooks/calendar", &hook).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, body) = post_webhook(&app, "/api/v1/webhooks/calendar", &hook).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duplicate"], false);
    assert_eq!(body["detail"]["change"], "created");

    let (_, body) = post_webhook(&app, "/api/v1/webhooks/calendar", &hook).await;
    assert_eq!(body["duplicate"], true);
}
