use crate::core::error::QllamaError;
use reqwest::{Client, Response};
use serde::Serialize;
use std::time::Duration;

/// Thin JSON client bound to one endpoint.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpClient {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, QllamaError> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        reqwest::Url::parse(&endpoint)
            .map_err(|e| QllamaError::Config(format!("Invalid endpoint '{}': {}", endpoint, e)))?;

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| QllamaError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    pub async fn get(&self, path: &str) -> Result<Response, QllamaError> {
        let request = self.authorize(self.client.get(self.url(path)));
        let response = request.send().await?;
        check_status(response).await
    }

    pub async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<Response, QllamaError> {
        let request = self
            .authorize(self.client.post(self.url(path)))
            .header("Content-Type", "application/json")
            .json(payload);
        let response = request.send().await?;
        check_status(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, QllamaError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(QllamaError::Api(format!(
        "{} returned {}: {}",
        status.canonical_reason().unwrap_or("server"),
        status.as_u16(),
        body.trim()
    )))
}
