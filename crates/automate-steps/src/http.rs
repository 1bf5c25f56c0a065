//! HTTP request step.

use reqwest::Method;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::StepError;
use crate::result::HttpResponse;
use crate::step::HttpInput;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Issues the request configured on an HTTP step.
#[derive(Clone)]
pub struct HttpStep {
    client: reqwest::Client,
}

impl HttpStep {
    /// Create an HTTP step runner with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, StepError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client })
    }

    /// Create an HTTP step runner with a custom client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Execute the request. Any received response is returned as-is, whatever
    /// its status; only transport and request-building failures are errors.
    pub async fn request(&self, input: &HttpInput) -> Result<HttpResponse, StepError> {
        let url = reqwest::Url::parse(&input.url).map_err(|e| {
            StepError::Configuration(format!("invalid url '{}': {}", input.url, e))
        })?;

        let method: Method = input.method.into();
        let mut request = self.client.request(method, url);

        if !input.parameters.is_empty() {
            request = request.query(&input.parameters);
        }

        for (key, value) in &input.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        if input.method.has_body() {
            match &input.body {
                Some(serde_json::Value::String(s)) => {
                    request = request.body(s.clone());
                }
                Some(serde_json::Value::Null) | None => {}
                Some(body) => {
                    request = request.json(body);
                }
            }
        }

        let response = request.send().await?;

        let status = response.status().as_u16();
        let mut headers: HashMap<String, String> = HashMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        let body = response.text().await?;

        tracing::debug!(url = %input.url, status, "HTTP step response received");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
