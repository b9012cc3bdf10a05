//! Agency Ops Library
//!
//! Backend for an AI-automation agency: prices and proposes packages, generates
//! cold-email copy with OpenAI, moves prospects through the GoHighLevel
//! pipeline, mirrors them to HubSpot and Instantly, books calls through Cal.com
//! and reports funnel metrics to Slack.
//!
//! # Modules
//!
//! - `api`: HTTP-layer namespace (handlers, routes, webhooks).
//! - `core`: Domain-layer namespace (pricing, email generation, pipeline, metrics).
//! - `integrations`: External service clients.
//! - `circuit_breaker`: Circuit breaker for upstream APIs.
//! - `config`: Configuration management.
//! - `email_generation`: AI cold-email variants with tagged template fallback.
//! - `errors`: Error handling types.
//! - `fingerprint`: Webhook body fingerprints for deduplication.
//! - `handlers`: HTTP request handlers and shared state.
//! - `metrics`: Cached funnel metrics and the Slack report.
//! - `models`: Core data models.
//! - `pipeline`: Dataset ingestion and opportunity stage moves.
//! - `pricing`: Package pricing, discounts, proposals and ROI.
//! - `resilience`: Rate limiter, retry with backoff and `Outcome`.
//! - `routes`: Router construction.
//! - `validation`: Email-variant and lead contact validation.
//! - `webhook_handler`: Apify, Instantly and Cal.com webhooks.
//! - `webhook_models`: Webhook payload models.

pub mod api;
pub mod core;
pub mod integrations;

pub mod circuit_breaker;
pub mod config;
pub mod email_generation;
pub mod errors;
pub mod fingerprint;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod pricing;
pub mod resilience;
pub mod routes;
pub mod validation;
pub mod webhook_handler;
pub mod webhook_models;
