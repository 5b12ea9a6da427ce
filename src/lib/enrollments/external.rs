use reqwest::Client;
use std::time::Duration;

use super::record::EnrollmentRecord;
use crate::skylearn::client::{ClientError, USER_AGENT};

pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(30);

/// Forwards enrollments to `{base}/enrollments`.
pub struct ExternalSystemClient {
    client: Client,
    endpoint: String,
}

impl ExternalSystemClient {
    pub fn new(base_url: &str) -> Result<ExternalSystemClient, ClientError> {
        let client = Client::builder()
            .timeout(FORWARD_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ClientError::Build)?;
        Ok(ExternalSystemClient {
            client,
            endpoint: format!("{}/enrollments", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn forward(&self, record: &EnrollmentRecord) -> Result<(), ClientError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(record)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: self.endpoint.clone(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                url: self.endpoint.clone(),
                status,
                body,
            });
        }
        Ok(())
    }
}
