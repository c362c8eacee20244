use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::migrate_error::AnyhowErrorExt;

/// HTTP transport used by the Storage, queue, Syrup and Encryption API wrappers.
///
/// Implementations only move bytes: they send the request and return the
/// response body of a 2xx response. Everything else becomes an [`HttpError`],
/// which lets the migration tell client errors (4xx, the caller's fault) from
/// server and transport errors. Implementations must not retry.
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends the request and returns the response body.
    ///
    /// # Errors
    /// * `HttpError::BadStatusCode` - For non-2xx responses, with the error message of the body
    /// * `HttpError::Timeout` - When the request times out
    /// * `HttpError::ConnectionRefused` - When the server cannot be reached
    /// * `HttpError::Generic` - For other unexpected errors
    async fn fetch(&self, request: HttpRequest) -> Result<Vec<u8>, HttpError>;
}

/// HTTP methods used by the API wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// HTTP GET method for retrieving data
    Get,
    /// HTTP POST method for creating jobs, tickets and actions
    Post,
    /// HTTP PUT method for updating configurations
    Put,
}

/// A single request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpHeader {
    /// Header name
    pub name: String,
    /// Header value
    pub value: String,
}

/// A request to be sent by an [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method
    pub method: HttpMethod,
    /// Absolute URL
    pub url: String,
    /// Request headers
    pub headers: Vec<HttpHeader>,
    /// JSON body, if any
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// A `GET` request without a body.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// A `POST` request with a JSON body.
    #[must_use]
    pub fn post(url: impl Into<String>, body: &Value) -> Self {
        Self::with_json_body(HttpMethod::Post, url.into(), body)
    }

    /// A `PUT` request with a JSON body.
    #[must_use]
    pub fn put(url: impl Into<String>, body: &Value) -> Self {
        Self::with_json_body(HttpMethod::Put, url.into(), body)
    }

    fn with_json_body(method: HttpMethod, url: String, body: &Value) -> Self {
        Self {
            method,
            url,
            headers: vec![HttpHeader {
                name: "Content-Type".to_string(),
                value: "application/json".to_string(),
            }],
            body: Some(body.to_string().into_bytes()),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push(HttpHeader {
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }
}

/// Represents HTTP-related errors that can occur during network requests.
#[crate::migrate_error]
pub enum HttpError {
    /// HTTP error with specific status code (4xx, 5xx responses)
    #[error("{message}")]
    BadStatusCode {
        /// The HTTP status code that was returned
        code: u16,
        /// The error message extracted from the response body
        message: String,
    },
    /// Request timed out
    #[error("Request timed out after {seconds} seconds")]
    Timeout {
        /// Number of seconds before timeout occurred
        seconds: u64,
    },
    /// Connection was refused by the server
    #[error("Connection refused by {host}")]
    ConnectionRefused {
        /// The host that refused the connection
        host: String,
    },
    /// The response body could not be decoded
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Decoding error
        message: String,
    },
}

impl HttpError {
    /// The HTTP status code, when the server answered.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::BadStatusCode { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the server rejected the request as the caller's fault (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_some_and(|code| (400..500).contains(&code))
    }
}

/// Sends the request and decodes the JSON response body.
///
/// # Errors
/// Transport errors of the client, or `HttpError::InvalidResponse` when the body is not the expected JSON.
pub async fn fetch_json<T: DeserializeOwned>(
    client: &dyn HttpClient,
    request: HttpRequest,
) -> Result<T, HttpError> {
    let body = client.fetch(request).await?;
    serde_json::from_slice(&body).map_err(|e| HttpError::InvalidResponse {
        message: e.to_string(),
    })
}

/// Pulls a readable message out of an error response.
///
/// Keboola APIs answer with `{"error": "...", "code": ...}` or
/// `{"message": "..."}`; anything else is returned as text.
fn error_message_from_body(status: u16, body: &[u8]) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
        for key in ["error", "message"] {
            if let Some(Value::String(message)) = map.get(key) {
                return message.clone();
            }
        }
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    if text.is_empty() {
        format!("Request failed with status code {status}")
    } else {
        text
    }
}

/// [`HttpClient`] backed by `reqwest` with rustls.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestHttpClient {
    /// Creates a client with a per-request timeout.
    ///
    /// # Errors
    /// Returns `HttpError::Generic` if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("project-migrate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HttpError::Generic {
                message: anyhow::Error::from(e).to_generic_message(),
            })?;
        Ok(Self { client, timeout })
    }

    fn map_transport_error(&self, url: &str, error: reqwest::Error) -> HttpError {
        if error.is_timeout() {
            return HttpError::Timeout {
                seconds: self.timeout.as_secs(),
            };
        }
        if error.is_connect() {
            let host = url::Url::parse(url)
                .ok()
                .and_then(|url| url.host_str().map(ToString::to_string))
                .unwrap_or_else(|| url.to_string());
            return HttpError::ConnectionRefused { host };
        }
        HttpError::Generic {
            message: anyhow::Error::from(error).to_generic_message(),
        }
    }
}

#[async_trait::async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn fetch(&self, request: HttpRequest) -> Result<Vec<u8>, HttpError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
        };

        let mut builder = self.client.request(method, &request.url);
        for header in &request.headers {
            builder = builder.header(header.name.as_str(), header.value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.map_transport_error(&request.url, e))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_transport_error(&request.url, e))?;

        if !status.is_success() {
            return Err(HttpError::BadStatusCode {
                code: status.as_u16(),
                message: error_message_from_body(status.as_u16(), &body),
            });
        }

        Ok(body.to_vec())
    }
}
