//! External service integrations.
//!
//! Every client shares [`api_client::ApiClient`], so they all get the same
//! timeout, error mapping and circuit breaker.

pub mod api_client;
pub mod apify;
pub mod calendar;
pub mod gohighlevel;
pub mod hubspot;
pub mod instantly;
pub mod openai;
pub mod slack;
