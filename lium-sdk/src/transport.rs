use crate::config::{ClientOptions, Config};
use crate::error::{LiumError, Result};
use crate::retry::RetryPolicy;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;

const API_KEY_HEADER: &str = "X-API-KEY";

/// Body and status of a successful API call.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    /// Decode the body; an empty body decodes as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let text = self.body.trim();
        let text = if text.is_empty() { "null" } else { text };
        Ok(serde_json::from_str(text)?)
    }
}

/// HTTP client for the fleet API: authentication header, status
/// classification and retry with backoff.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(config: &Config, options: &ClientOptions) -> Result<Self> {
        // No overall timeout means a stalled API call hangs the caller forever.
        let client = Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| {
                LiumError::configuration(format!("cannot build HTTP client: {}", e), "check TLS setup")
            })?;
        let api_key = config.api_key.trim().to_string();
        HeaderValue::from_str(&api_key).map_err(|_| {
            LiumError::configuration("API key contains invalid characters", "re-copy the key")
        })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            api_key,
            retry: options.retry.clone(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.api_key) {
            headers.insert(API_KEY_HEADER, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    async fn send_once(&self, method: Method, url: &str, body: Option<&Value>) -> Result<ApiResponse> {
        let mut req = self
            .client
            .request(method.clone(), url)
            .headers(self.headers());
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(LiumError::Connection)?;
        let status = resp.status();
        let text = resp.text().await.map_err(LiumError::Connection)?;

        if !status.is_success() {
            tracing::debug!(
                "[transport] {} {} failed: status={}, response={}",
                method,
                url,
                status.as_u16(),
                text
            );
            return Err(LiumError::from_status(status.as_u16(), &text));
        }

        tracing::trace!("[transport] {} {} -> {}", method, url, status.as_u16());
        Ok(ApiResponse {
            status: status.as_u16(),
            body: text,
        })
    }

    /// Issue a request, retrying rate limits, 5xx and connection failures.
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<ApiResponse> {
        let url = self.url(path);
        self.retry
            .run(|| self.send_once(method.clone(), &url, body), tokio::time::sleep)
            .await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::GET, path, None).await?.json()
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, path, Some(body)).await?.json()
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.request(Method::DELETE, path, None).await?.json()
    }
}
