use crate::circuit_breaker::{create_upstream_circuit_breaker, UpstreamBreaker};
use crate::errors::AppError;
use failsafe::futures::CircuitBreaker;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// How an upstream expects its credential.
#[derive(Clone)]
pub enum Auth {
    Bearer(String),
    /// e.g. Cal.com's `?apiKey=` or Apify's `?token=`
    Query { param: &'static str, value: String },
    None,
}

/// JSON-over-HTTP client shared by every integration.
///
/// Wraps `reqwest` with the upstream's base URL, credentials, a 30s timeout
/// and a circuit breaker so a dead integration fails fast.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    service: &'static str,
    base_url: String,
    auth: Auth,
    headers: Vec<(&'static str, String)>,
    breaker: UpstreamBreaker,
}

impl ApiClient {
    /// Creates a new `ApiClient`.
    ///
    /// # Arguments
    ///
    /// * `service` - Name used in logs and error messages.
    /// * `base_url` - The base URL of the API, without trailing slash.
    /// * `auth` - Credential placement.
    pub fn new(service: &'static str, base_url: &str, auth: Auth) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create {} client: {}", service, e))
            })?;

        Ok(Self {
            client,
            service,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            headers: Vec::new(),
            breaker: create_upstream_circuit_breaker(),
        })
    }

    /// Adds a header sent with every request (e.g. GoHighLevel's `Version`).
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, AppError> {
        let request = self.request(Method::GET, path).query(query);
        self.execute(Method::GET, path, request).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AppError> {
        let request = self.request(Method::POST, path).json(body);
        self.execute(Method::POST, path, request).await
    }

    pub async fn delete_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AppError> {
        let request = self.request(Method::DELETE, path).json(body);
        self.execute(Method::DELETE, path, request).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, url);

        request = match &self.auth {
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::Query { param, value } => request.query(&[(*param, value.as_str())]),
            Auth::None => request,
        };

        for (name, value) in &self.headers {
            request = request.header(*name, value);
        }
        request
    }

    /// POSTs JSON and returns the raw response text, for upstreams that
    /// answer with plain text (Slack's `ok`).
    pub async fn post_text<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<String, AppError> {
        let request = self.request(Method::POST, path).json(body);
        self.send(Method::POST, path, request).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        request: RequestBuilder,
    ) -> Result<T, AppError> {
        let text = self.send(method, path, request).await?;
        // 204 / empty bodies deserialize as JSON null
        let body = if text.trim().is_empty() { "null" } else { text.as_str() };

        serde_json::from_str::<T>(body).map_err(|e| {
            AppError::ExternalApiError(format!(
                "Failed to parse {} response: {}",
                self.service, e
            ))
        })
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        request: RequestBuilder,
    ) -> Result<String, AppError> {
        let service = self.service;
        tracing::debug!("{} {} {}", service, method, path);

        let call = async move {
            let response = request.send().await.map_err(|e| {
                AppError::ExternalApiError(format!("{} request failed: {}", service, e))
            })?;

            let status = response.status();
            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(AppError::ExternalApiError(format!(
                    "{} returned {}: {}",
                    service, status, error_text
                )));
            }

            response.text().await.map_err(|e| {
                AppError::ExternalApiError(format!("Failed to read {} response: {}", service, e))
            })
        };

        match self.breaker.call(call).await {
            Ok(text) => Ok(text),
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => {
                tracing::warn!("⚠️  {} circuit breaker open, rejecting {} {}", service, method, path);
                Err(AppError::ExternalApiError(format!(
                    "{} circuit breaker open",
                    service
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let client = ApiClient::new("test", "https://example.com/", Auth::None);
        assert!(client.is_ok());
        assert_eq!(client.unwrap().base_url, "https://example.com");
    }
}
