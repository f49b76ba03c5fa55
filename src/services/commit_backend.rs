use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::config::HttpClientConfig;
use crate::error::CommitError;
use crate::models::ChildRecordRequest;
use crate::utils::http::{endpoint, error_message, parse_base_url};

/// Durable storage for child records. One call creates one record and claims
/// the staged object behind its token.
#[async_trait]
pub trait CommitBackend: Send + Sync {
    async fn create_child_record(&self, request: &ChildRecordRequest) -> Result<i64, CommitError>;
}

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: i64,
}

#[derive(Debug, Clone)]
pub struct HttpCommitBackend {
    client: Client,
    base_url: Url,
}

impl HttpCommitBackend {
    pub fn new(config: &HttpClientConfig) -> Result<Self, CommitError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CommitError::Transport(e.to_string()))?;
        Self::with_client(client, &config.base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, CommitError> {
        let base_url = parse_base_url(base_url).map_err(CommitError::InvalidBaseUrl)?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl CommitBackend for HttpCommitBackend {
    async fn create_child_record(&self, request: &ChildRecordRequest) -> Result<i64, CommitError> {
        let url = endpoint(&self.base_url, &["records"]);
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CommitError::Timeout
                } else {
                    CommitError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CommitError::Rejected {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        let created: CreatedResponse = response
            .json()
            .await
            .map_err(|e| CommitError::InvalidResponse(e.to_string()))?;
        Ok(created.id)
    }
}
