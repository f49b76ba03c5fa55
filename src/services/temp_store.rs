use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use url::Url;

use crate::config::HttpClientConfig;
use crate::error::StoreError;
use crate::models::{LocalFile, StoredObject, TempToken};
use crate::utils::filename::{content_type_for_name, parse_content_disposition_filename};
use crate::utils::http::{endpoint, error_message, parse_base_url};

/// Scratch storage for files whose parent record does not exist yet.
#[async_trait]
pub trait TempObjectStore: Send + Sync {
    async fn upload(&self, file: &LocalFile) -> Result<TempToken, StoreError>;
    async fn preview(&self, token: &TempToken) -> Result<StoredObject, StoreError>;
    async fn download(&self, token: &TempToken) -> Result<StoredObject, StoreError>;
    /// Deleting an object that is already gone is not an error.
    async fn delete(&self, token: &TempToken) -> Result<(), StoreError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// `TempObjectStore` over the `/temp-objects` HTTP routes.
#[derive(Debug, Clone)]
pub struct HttpTempObjectStore {
    client: Client,
    base_url: Url,
}

impl HttpTempObjectStore {
    pub fn new(config: &HttpClientConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Self::with_client(client, &config.base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, StoreError> {
        let base_url = parse_base_url(base_url).map_err(StoreError::InvalidBaseUrl)?;
        Ok(Self { client, base_url })
    }

    async fn fetch(&self, token: &TempToken, action: &str) -> Result<StoredObject, StoreError> {
        let url = endpoint(&self.base_url, &["temp-objects", token.as_str(), action]);
        let response = self.client.get(url).send().await.map_err(map_reqwest)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound);
        }
        if !status.is_success() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        let suggested_name = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_disposition_filename);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| suggested_name.as_deref().map(content_type_for_name))
            .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());
        let bytes = response.bytes().await.map_err(map_reqwest)?;

        Ok(StoredObject {
            bytes,
            content_type,
            suggested_name,
        })
    }
}

#[async_trait]
impl TempObjectStore for HttpTempObjectStore {
    async fn upload(&self, file: &LocalFile) -> Result<TempToken, StoreError> {
        let part = reqwest::multipart::Part::stream_with_length(file.bytes.clone(), file.size())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type())
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("original_name", file.name.clone())
            .text("size_bytes", file.size().to_string())
            .part("file", part);

        let url = endpoint(&self.base_url, &["temp-objects"]);
        let response = self
            .client
            .put(url)
            .multipart(form)
            .send()
            .await
            .map_err(map_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        if body.token.trim().is_empty() {
            return Err(StoreError::InvalidResponse("empty token".to_string()));
        }
        Ok(TempToken::new(body.token))
    }

    async fn preview(&self, token: &TempToken) -> Result<StoredObject, StoreError> {
        self.fetch(token, "preview").await
    }

    async fn download(&self, token: &TempToken) -> Result<StoredObject, StoreError> {
        self.fetch(token, "download").await
    }

    async fn delete(&self, token: &TempToken) -> Result<(), StoreError> {
        let url = endpoint(&self.base_url, &["temp-objects", token.as_str()]);
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(map_reqwest)?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(StoreError::Rejected {
            status: status.as_u16(),
            message: error_message(response).await,
        })
    }
}

fn map_reqwest(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout
    } else {
        StoreError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_from_config() {
        assert!(HttpTempObjectStore::new(&HttpClientConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpTempObjectStore::with_client(Client::new(), "not a url"),
            Err(StoreError::InvalidBaseUrl(_))
        ));
    }
}
