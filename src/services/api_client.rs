//! Thin HTTP transport shared by the helpdesk and AI clients.
//!
//! Every call resolves to an [`ApiResponse`]: non-2xx statuses are data, not
//! errors, and no retry happens here. Callers own the retry policy.

use std::time::Duration;

use reqwest::{header::RETRY_AFTER, Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use crate::error::{AppError, AppResult};

/// Tri-state result of one API call
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse<T> {
    Success(T),
    /// HTTP 429, with the server's `Retry-After` hint when it sent one
    RateLimited { retry_after: Option<Duration> },
    /// Any other failure. `status` is `None` when no response arrived.
    Failure { status: Option<u16>, body: String },
}

impl<T> ApiResponse<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        match self {
            ApiResponse::Success(v) => ApiResponse::Success(f(v)),
            ApiResponse::RateLimited { retry_after } => ApiResponse::RateLimited { retry_after },
            ApiResponse::Failure { status, body } => ApiResponse::Failure { status, body },
        }
    }

    pub fn failure(status: Option<u16>, body: impl Into<String>) -> Self {
        ApiResponse::Failure {
            status,
            body: body.into(),
        }
    }
}

/// Human-readable description of a failed call
pub fn describe_failure(status: Option<u16>, body: &str) -> String {
    let body = body.trim();
    let snippet: String = body.chars().take(300).collect();
    match status {
        Some(code) if snippet.is_empty() => format!("HTTP {code}"),
        Some(code) => format!("HTTP {code}: {snippet}"),
        None => format!("transport error: {snippet}"),
    }
}

fn parse_retry_after(value: Option<&reqwest::header::HeaderValue>) -> Option<Duration> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Bearer-authenticated JSON client bound to one API root
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    bearer: SecretString,
    headers: Vec<(String, String)>,
}

impl ApiClient {
    pub fn new(base_url: &str, bearer: SecretString, timeout: Duration) -> AppResult<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| AppError::Configuration(format!("invalid API base URL '{base_url}': {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            bearer,
            headers: Vec::new(),
        })
    }

    /// Add a header sent on every request (API versioning and the like)
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> AppResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| AppError::Validation(format!("invalid endpoint path '{path}': {e}")))
    }

    fn authorize(&self, mut request: RequestBuilder) -> RequestBuilder {
        request = request
            .header("Authorization", format!("Bearer {}", self.bearer.expose_secret()))
            .header("Accept", "application/json");
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResponse<T> {
        let url = match self.endpoint(path) {
            Ok(url) => url,
            Err(e) => return ApiResponse::failure(None, e.to_string()),
        };
        self.send(self.authorize(self.http.get(url))).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> ApiResponse<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = match self.endpoint(path) {
            Ok(url) => url,
            Err(e) => return ApiResponse::failure(None, e.to_string()),
        };
        self.send(self.authorize(self.http.post(url)).json(body)).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResponse<T> {
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("request failed before a response: {}", e);
                return ApiResponse::failure(None, e.to_string());
            }
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(response.headers().get(RETRY_AFTER));
            tracing::debug!(url = %response.url(), ?retry_after, "rate limited");
            return ApiResponse::RateLimited { retry_after };
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return ApiResponse::failure(Some(status.as_u16()), body);
        }

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => return ApiResponse::failure(Some(status.as_u16()), e.to_string()),
        };

        match serde_json::from_slice::<T>(&bytes) {
            Ok(value) => ApiResponse::Success(value),
            Err(e) => ApiResponse::failure(
                Some(status.as_u16()),
                format!("failed to decode response body: {e}"),
            ),
        }
    }
}
