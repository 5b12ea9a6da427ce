use reqwest::{
    header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, StatusCode,
};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::models::{ApiStatus, Subscription, Transaction};
use crate::error;
use crate::telemetry::LogKey;

pub const API_PREFIX: &str = "wp-json/slbp/v1";
pub const USER_AGENT: &str = "SkyLearn-Sync-Script/1.0";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("API key can't be sent as a header.")]
    InvalidApiKey(#[from] InvalidHeaderValue),
    #[error("Could not build HTTP client. {0}")]
    Build(#[source] reqwest::Error),
    #[error("Request to {url} failed. {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned {status}.")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("Could not deserialize response from {url}. {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Joins filters as `k=v&k=v`. Values are passed through as they are.
pub fn with_filters(endpoint: &str, filters: &[(&str, String)]) -> String {
    if filters.is_empty() {
        return endpoint.to_string();
    }
    let query = filters
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", endpoint, query)
}

/// Error bodies are JSON most of the time; fall back to the raw text.
pub fn describe_error_body(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(details) => format!("Error details: {}", details),
        Err(_) => format!("Response text: {}", body),
    }
}

pub struct SkyLearnClient {
    client: Client,
    api_url: String,
}

impl SkyLearnClient {
    pub fn new(base_url: &str, api_key: &SecretString) -> Result<SkyLearnClient, ClientError> {
        let mut authorization =
            HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))?;
        authorization.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ClientError::Build)?;
        Ok(SkyLearnClient {
            client,
            api_url: format!("{}/{}", base_url.trim_end_matches('/'), API_PREFIX),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ClientError> {
        let url = format!("{}/{}", self.api_url, endpoint.trim_start_matches('/'));
        let resp = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(source) => {
                error!(
                    LogKey::ApiRequestFailed,
                    url = url.as_str(),
                    error = %source,
                    "API request failed."
                );
                return Err(ClientError::Transport { url, source });
            }
        };
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(
                LogKey::ApiRequestFailed,
                url = url.as_str(),
                status = status.as_u16(),
                details = describe_error_body(&body).as_str(),
                "API request failed."
            );
            return Err(ClientError::Status { url, status, body });
        }
        resp.json::<T>()
            .await
            .map_err(|source| ClientError::Decode { url, source })
    }

    /// Liveness probe.
    pub async fn get_status(&self) -> Result<ApiStatus, ClientError> {
        self.get("status").await
    }

    pub async fn get_transactions(
        &self,
        filters: &[(&str, String)],
    ) -> Result<Vec<Transaction>, ClientError> {
        self.get(&with_filters("billing/transactions", filters))
            .await
    }

    pub async fn get_subscriptions(
        &self,
        filters: &[(&str, String)],
    ) -> Result<Vec<Subscription>, ClientError> {
        self.get(&with_filters("subscriptions", filters)).await
    }
}
