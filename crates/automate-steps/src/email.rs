//! Email step backed by the Mailjet v3.1 send API.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::StepError;
use crate::step::EmailInput;

/// Mailjet account and sender settings.
#[derive(Debug, Clone)]
pub struct MailjetConfig {
    /// Send endpoint.
    pub api_url: String,

    /// Public API key (basic auth user).
    pub api_key_public: String,

    /// Private API key (basic auth password).
    pub api_key_private: String,

    pub sender_email: String,

    pub sender_name: String,
}

impl MailjetConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: std::env::var("MAILJET_API_URL").unwrap_or(defaults.api_url),
            api_key_public: std::env::var("MAILJET_APIKEY_PUBLIC")
                .unwrap_or(defaults.api_key_public),
            api_key_private: std::env::var("MAILJET_APIKEY_PRIVATE")
                .unwrap_or(defaults.api_key_private),
            sender_email: std::env::var("MAILJET_SENDER_EMAIL").unwrap_or(defaults.sender_email),
            sender_name: std::env::var("MAILJET_SENDER_NAME").unwrap_or(defaults.sender_name),
        }
    }
}

impl Default for MailjetConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.mailjet.com/v3.1/send".to_string(),
            api_key_public: "your-api-key".to_string(),
            api_key_private: "your-api-secret".to_string(),
            sender_email: "automate@localhost".to_string(),
            sender_name: "Automate".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Address<'a> {
    email: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Message<'a> {
    from: Address<'a>,
    to: Vec<Address<'a>>,
    subject: &'a str,
    text_part: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendRequest<'a> {
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendResponse {
    #[serde(default)]
    messages: Vec<MessageStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MessageStatus {
    status: String,
}

/// Sends the single message configured on an email step.
#[derive(Clone)]
pub struct EmailStep {
    client: reqwest::Client,
    config: MailjetConfig,
}

impl EmailStep {
    /// Create an email step runner.
    pub fn new(config: MailjetConfig, timeout: Duration) -> Result<Self, StepError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, config })
    }

    /// Send the email. Returns whether the provider accepted it; a rejection or
    /// an unreachable provider is logged and reported as `false`, never as an error.
    pub async fn send(&self, input: &EmailInput) -> bool {
        match self.try_send(input).await {
            Ok(true) => {
                tracing::info!(recipients = %input.recipients, "Email accepted by provider");
                true
            }
            Ok(false) => {
                tracing::warn!(recipients = %input.recipients, "Email rejected by provider");
                false
            }
            Err(e) => {
                tracing::error!(recipients = %input.recipients, error = %e, "Email send failed");
                false
            }
        }
    }

    async fn try_send(&self, input: &EmailInput) -> Result<bool, StepError> {
        let recipients = input.recipient_list();
        if recipients.is_empty() {
            return Err(StepError::Configuration("email step has no recipients".to_string()));
        }

        let payload = SendRequest {
            messages: vec![Message {
                from: Address {
                    email: &self.config.sender_email,
                    name: &self.config.sender_name,
                },
                to: recipients
                    .into_iter()
                    .map(|email| Address { email, name: email })
                    .collect(),
                subject: &input.subject,
                text_part: &input.body,
            }],
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .basic_auth(&self.config.api_key_public, Some(&self.config.api_key_private))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(%status, body = %body, "Mailjet returned an error status");
            return Ok(false);
        }

        let ack: SendResponse = response.json().await?;
        Ok(!ack.messages.is_empty() && ack.messages.iter().all(|m| m.status == "success"))
    }
}
