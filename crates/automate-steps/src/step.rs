//! Step definitions.
//!
//! A step is one configured unit of work inside a workflow. Steps are read from
//! the run state store as raw records and decoded into a typed [`StepAction`]
//! before a run starts, so an unknown kind or a malformed payload is caught once
//! instead of on every attempt.

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::StepError;

/// Discriminator of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Http,
    Webhook,
    Schedule,
    Email,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Http => "http",
            StepKind::Webhook => "webhook",
            StepKind::Schedule => "schedule",
            StepKind::Email => "email",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(StepKind::Http),
            "webhook" => Ok(StepKind::Webhook),
            "schedule" => Ok(StepKind::Schedule),
            "email" => Ok(StepKind::Email),
            other => Err(StepError::InvalidDefinition(format!(
                "unsupported step kind '{}'",
                other
            ))),
        }
    }
}

/// Whether a step starts a workflow or acts inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepRole {
    Trigger,
    #[default]
    Action,
}

impl From<&str> for StepRole {
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("trigger") {
            StepRole::Trigger
        } else {
            StepRole::Action
        }
    }
}

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
#[allow(clippy::upper_case_acronyms)] // HTTP methods are conventionally uppercase
pub enum HttpMethod {
    #[default]
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
    HEAD,
    OPTIONS,
}

impl HttpMethod {
    /// Methods whose requests carry a body.
    pub fn has_body(&self) -> bool {
        matches!(self, HttpMethod::POST | HttpMethod::PUT | HttpMethod::PATCH | HttpMethod::DELETE)
    }
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::GET => Method::GET,
            HttpMethod::POST => Method::POST,
            HttpMethod::PUT => Method::PUT,
            HttpMethod::PATCH => Method::PATCH,
            HttpMethod::DELETE => Method::DELETE,
            HttpMethod::HEAD => Method::HEAD,
            HttpMethod::OPTIONS => Method::OPTIONS,
        }
    }
}

/// Input of an HTTP step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpInput {
    /// URL to request.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default)]
    pub method: HttpMethod,

    /// Request headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Query parameters appended to the URL.
    #[serde(default)]
    pub parameters: HashMap<String, String>,

    /// Request body. Strings are sent verbatim, anything else as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// Input of a webhook trigger step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookInput {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// How a schedule trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    Fixed,
    Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedTime {
    /// ISO 8601 timestamp as entered in the builder.
    pub date_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleInterval {
    pub unit: IntervalUnit,
    pub value: u32,
}

/// Schedule of a schedule trigger step.
///
/// Firing is decided before a run is ever enqueued; the worker only keeps the
/// definition for logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSpec {
    #[serde(rename = "type")]
    pub mode: ScheduleMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_time: Option<FixedTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<ScheduleInterval>,
}

/// Input of an email step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailInput {
    /// One address, or several separated by commas.
    #[serde(alias = "reciepents")]
    pub recipients: String,

    pub subject: String,

    pub body: String,
}

impl EmailInput {
    /// Individual recipient addresses.
    pub fn recipient_list(&self) -> Vec<&str> {
        self.recipients
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Typed configuration of a step, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "key", rename_all = "lowercase")]
pub enum StepAction {
    Http {
        input: HttpInput,
    },
    Webhook {
        #[serde(default)]
        input: Option<WebhookInput>,
    },
    Schedule {
        #[serde(default)]
        schedule: Option<ScheduleSpec>,
    },
    Email {
        input: EmailInput,
    },
}

impl StepAction {
    pub fn kind(&self) -> StepKind {
        match self {
            StepAction::Http { .. } => StepKind::Http,
            StepAction::Webhook { .. } => StepKind::Webhook,
            StepAction::Schedule { .. } => StepKind::Schedule,
            StepAction::Email { .. } => StepKind::Email,
        }
    }
}

/// Raw step row as stored by the workflow builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub workflow_id: String,
    pub app: String,
    pub step_no: i32,
    #[serde(rename = "type")]
    pub step_type: String,
    pub data: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A decoded step, owned by the run that executes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub workflow_id: String,
    /// 1-based position; defines execution order.
    pub step_no: u32,
    pub role: StepRole,
    pub action: StepAction,
}

impl Step {
    /// Decode a stored record. The record's `app` column decides the kind.
    pub fn from_record(record: StepRecord) -> Result<Self, StepError> {
        let kind: StepKind = record.app.parse()?;

        let step_no = u32::try_from(record.step_no)
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| {
                StepError::InvalidDefinition(format!(
                    "step {} has invalid step_no {}",
                    record.id, record.step_no
                ))
            })?;

        let mut data = match record.data {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(StepError::InvalidDefinition(format!(
                    "step {} data must be an object, got {}",
                    step_no, other
                )))
            }
        };
        data.insert(
            "key".to_string(),
            serde_json::Value::String(kind.as_str().to_string()),
        );

        let action: StepAction = serde_json::from_value(serde_json::Value::Object(data))
            .map_err(|e| {
                StepError::InvalidDefinition(format!("step {} ({}): {}", step_no, kind, e))
            })?;

        Ok(Self {
            id: record.id,
            name: record.name,
            description: record.description,
            workflow_id: record.workflow_id,
            step_no,
            role: StepRole::from(record.step_type.as_str()),
            action,
        })
    }

    pub fn kind(&self) -> StepKind {
        self.action.kind()
    }

    /// Encode back into the stored row shape.
    pub fn to_record(&self) -> StepRecord {
        let step_type = match self.role {
            StepRole::Trigger => "trigger",
            StepRole::Action => "action",
        };

        StepRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            workflow_id: self.workflow_id.clone(),
            app: self.kind().to_string(),
            step_no: i32::try_from(self.step_no).unwrap_or(i32::MAX),
            step_type: step_type.to_string(),
            data: serde_json::to_value(&self.action).unwrap_or(serde_json::Value::Null),
            created_at: None,
            updated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(app: &str, step_no: i32, data: serde_json::Value) -> StepRecord {
        StepRecord {
            id: format!("job-{}", step_no),
            name: format!("{} step", app),
            description: None,
            workflow_id: "wf-1".to_string(),
            app: app.to_string(),
            step_no,
            step_type: "action".to_string(),
            data,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_step_kind_round_trip_through_str() {
        for kind in [StepKind::Http, StepKind::Webhook, StepKind::Schedule, StepKind::Email] {
            assert_eq!(kind.to_string().parse::<StepKind>().unwrap(), kind);
        }
        assert!("ftp".parse::<StepKind>().is_err());
    }

    #[test]
    fn test_http_record_decodes() {
        let step = Step::from_record(record(
            "http",
            1,
            serde_json::json!({
                "key": "http",
                "input": {
                    "url": "https://api.example.com/hook",
                    "method": "POST",
                    "headers": {"X-Token": "abc"},
                    "parameters": {"page": "2"},
                    "body": "{\"hello\":1}"
                }
            }),
        ))
        .unwrap();

        assert_eq!(step.kind(), StepKind::Http);
        assert_eq!(step.step_no, 1);
        match step.action {
            StepAction::Http { input } => {
                assert_eq!(input.method, HttpMethod::POST);
                assert_eq!(input.headers.get("X-Token").map(String::as_str), Some("abc"));
                assert_eq!(input.parameters.get("page").map(String::as_str), Some("2"));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_app_column_wins_over_data_key() {
        let step = Step::from_record(record(
            "webhook",
            1,
            serde_json::json!({"key": "http", "input": {"webhookUrl": "https://hooks/abc"}}),
        ))
        .unwrap();
        assert_eq!(step.kind(), StepKind::Webhook);
    }

    #[test]
    fn test_trigger_steps_tolerate_missing_input() {
        let step = Step::from_record(record("schedule", 1, serde_json::Value::Null)).unwrap();
        assert_eq!(step.kind(), StepKind::Schedule);

        let step = Step::from_record(record(
            "schedule",
            1,
            serde_json::json!({
                "schedule": {"type": "interval", "interval": {"unit": "hour", "value": 6}}
            }),
        ))
        .unwrap();
        match step.action {
            StepAction::Schedule { schedule: Some(spec) } => {
                assert_eq!(spec.mode, ScheduleMode::Interval);
                assert_eq!(spec.interval.unwrap().unit, IntervalUnit::Hour);
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_email_accepts_legacy_recipient_key() {
        let step = Step::from_record(record(
            "email",
            2,
            serde_json::json!({
                "input": {"reciepents": "a@x.io, b@x.io", "subject": "hi", "body": "there"},
                "output": {"success": true}
            }),
        ))
        .unwrap();
        match step.action {
            StepAction::Email { input } => {
                assert_eq!(input.recipient_list(), vec!["a@x.io", "b@x.io"]);
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_unknown_app_is_rejected() {
        let err = Step::from_record(record("ftp", 1, serde_json::json!({}))).unwrap_err();
        assert!(matches!(err, StepError::InvalidDefinition(_)));
    }

    #[test]
    fn test_missing_http_url_is_rejected() {
        let err =
            Step::from_record(record("http", 3, serde_json::json!({"input": {}}))).unwrap_err();
        assert!(err.to_string().contains("step 3 (http)"));
    }

    #[test]
    fn test_zero_step_no_is_rejected() {
        let err = Step::from_record(record("webhook", 0, serde_json::json!({}))).unwrap_err();
        assert!(matches!(err, StepError::InvalidDefinition(_)));
    }

    #[test]
    fn test_record_survives_encode_and_decode() {
        let decoded_once = Step::from_record(record(
            "email",
            4,
            serde_json::json!({"input": {"recipients": "a@x.io", "subject": "s", "body": "b"}}),
        ))
        .unwrap();

        let encoded = decoded_once.to_record();
        assert_eq!(encoded.app, "email");
        assert_eq!(encoded.step_no, 4);
        assert_eq!(encoded.data["input"]["recipients"], "a@x.io");

        let decoded = Step::from_record(encoded).unwrap();
        assert_eq!(decoded.kind(), StepKind::Email);
        assert_eq!(decoded.step_no, 4);
    }

    #[test]
    fn test_role_from_type_column() {
        assert_eq!(StepRole::from("trigger"), StepRole::Trigger);
        assert_eq!(StepRole::from("action"), StepRole::Action);
    }
}
