//! HTTP client abstraction for driving the system under test.
//!
//! The runner and load drivers talk to the backend through [`ApiClient`],
//! so tests can swap in scripted fakes. The production implementation is
//! a thin reqwest wrapper carrying a caller-supplied timeout so a hung
//! endpoint cannot stall a whole run.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::spec::Method;

/// A concrete request issued against the backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the client's base URL, query string included.
    pub path: String,
    pub body: Option<JsonValue>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }
}

/// A backend response with parse bookkeeping.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub body_text: String,
    /// `Some` only when the body parsed as JSON.
    pub json: Option<JsonValue>,
    pub elapsed: Duration,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level failure (connection refused, timeout, DNS).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TransportError {}

/// Asynchronous request/response exchange with the system under test.
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// reqwest-backed client.
#[derive(Clone, Debug)]
pub struct HttpApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpApiClient {
    /// Builds a client for a base URL with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TransportError::new(error.to_string()))?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
            Method::Put => self.http.put(&url),
            Method::Delete => self.http.delete(&url),
            Method::Patch => self.http.patch(&url),
        };
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|error| TransportError::new(error.to_string()))?;
        let status = response.status().as_u16();
        let body_text = response
            .text()
            .await
            .map_err(|error| TransportError::new(error.to_string()))?;
        let elapsed = started.elapsed();
        let json = serde_json::from_str(&body_text).ok();

        Ok(ApiResponse {
            status,
            body_text,
            json,
            elapsed,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_clients {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted client returning queued responses and recording requests.
    pub(crate) struct QueueClient {
        pub(crate) requests: Mutex<Vec<ApiRequest>>,
        responses: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
        fallback: Option<ApiResponse>,
    }

    impl QueueClient {
        pub(crate) fn new(responses: Vec<Result<ApiResponse, TransportError>>) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                responses: Mutex::new(VecDeque::from(responses)),
                fallback: None,
            }
        }

        /// Returns the fallback response once the queue is drained,
        /// instead of erroring.
        pub(crate) fn with_fallback(mut self, fallback: ApiResponse) -> Self {
            self.fallback = Some(fallback);
            self
        }
    }

    #[async_trait]
    impl ApiClient for QueueClient {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
            self.requests.lock().expect("requests lock").push(request);
            let next = self.responses.lock().expect("responses lock").pop_front();
            match next {
                Some(response) => response,
                None => match &self.fallback {
                    Some(fallback) => Ok(fallback.clone()),
                    None => Err(TransportError::new("no scripted response")),
                },
            }
        }
    }

    pub(crate) fn json_response(status: u16, body: serde_json::Value) -> ApiResponse {
        ApiResponse {
            status,
            body_text: body.to_string(),
            json: Some(body),
            elapsed: Duration::from_millis(1),
        }
    }

    pub(crate) fn text_response(status: u16, body: &str) -> ApiResponse {
        ApiResponse {
            status,
            body_text: body.to_string(),
            json: serde_json::from_str(body).ok(),
            elapsed: Duration::from_millis(1),
        }
    }
}
