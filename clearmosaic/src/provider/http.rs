//! HTTP client abstraction for testability

use std::time::Duration;

use super::types::ProviderError;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request.
    ///
    /// # Returns
    ///
    /// The response body as bytes. A 404 maps to
    /// [`ProviderError::TileNotFound`], other failures to
    /// [`ProviderError::HttpError`].
    fn get(&self, url: &str) -> Result<Vec<u8>, ProviderError>;

    /// Performs an HTTP POST with a JSON body and returns the response body.
    fn post_json(&self, url: &str, body: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient with the default 30 second timeout.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Creates a new ReqwestClient with a custom timeout applied to every
    /// request.
    pub fn with_timeout(timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| {
                ProviderError::HttpError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    fn read_body(
        response: reqwest::blocking::Response,
        url: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::TileNotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(ProviderError::HttpError(format!(
                "HTTP {} from {}",
                status, url
            )));
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| ProviderError::HttpError(format!("Failed to read response: {}", e)))
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| ProviderError::HttpError(format!("Request failed: {}", e)))?;

        Self::read_body(response, url)
    }

    fn post_json(&self, url: &str, body: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .map_err(|e| ProviderError::HttpError(format!("Request failed: {}", e)))?;

        Self::read_body(response, url)
    }
}
