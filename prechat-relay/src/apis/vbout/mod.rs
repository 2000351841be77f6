mod strategy;

pub use strategy::{AuthPlacement, Encoding, TransportStrategy, Verb};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use std::{collections::HashMap, time::Duration};

use super::{ApiError, DEFAULT_TIMEOUT_SECONDS};

#[derive(Deserialize)]
pub struct VboutConfig {
    /// The permissioned API key, interpolated from the secrets file
    pub api_key: String,
    /// List new contacts are attached to. Only sent when present.
    pub list_id: Option<String>,
    /// Root of the VBout REST API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// The number of seconds until an external API request times out.
    /// If `None`, the `DEFAULT_TIMEOUT_SECONDS` will be used.
    pub api_timeout_seconds: Option<u64>,
    /// Transport strategies tried in order until one reports success
    #[serde(default = "strategy::default_strategies")]
    pub strategies: Vec<TransportStrategy>,
    /// How an upstream rejection maps onto the webhook reply status
    #[serde(default)]
    pub rejection_status: RejectionStatus,
    /// Parameter name the visitor id is sent under
    #[serde(default = "default_visitor_field")]
    pub visitor_field: String,
    /// Parameter name the originating page URL is sent under
    #[serde(default = "default_source_field")]
    pub source_field: String,
}

fn default_base_url() -> String {
    "https://api.vbout.com/1".to_string()
}

fn default_visitor_field() -> String {
    "customfield1".to_string()
}

fn default_source_field() -> String {
    "customfield2".to_string()
}

/// What status the webhook reply carries when the CRM rejects the contact.
/// The chat platform re-delivers on 5xx, so `Accepted` keeps rejections
/// quiet while `PassThrough` makes them visible to the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionStatus {
    #[default]
    Accepted,
    PassThrough,
}

#[derive(Debug)]
pub enum VboutError {
    InvalidBaseUrl(String),
    InvalidStrategy(String),
    InvalidTimeout,
    NoStrategies,
}

impl std::fmt::Display for VboutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VboutError::InvalidBaseUrl(e) => write!(f, "the base URL is invalid: {e}"),
            VboutError::InvalidStrategy(e) => write!(f, "a transport strategy is invalid: {e}"),
            VboutError::InvalidTimeout => write!(f, "the API timeout must be non zero"),
            VboutError::NoStrategies => write!(f, "at least one transport strategy is required"),
        }
    }
}

/// A CRM contact derived from a prechat form submission. Never constructed
/// with an empty email.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContactRecord {
    pub email: String,
    pub phone: String,
    pub country: String,
    pub visitor_id: String,
    pub property_url: String,
}

/// The outcome of a single outbound attempt. `status` is `None` when the
/// CRM could not be reached at all. `detail` is always redacted.
#[derive(Clone, Debug, Serialize)]
pub struct AttemptReport {
    pub strategy: String,
    pub status: Option<u16>,
    pub success: bool,
    pub detail: Value,
}

/// The terminal outcome after running the strategy list
pub enum DeliveryResult {
    /// A strategy succeeded; later ones were never attempted
    Delivered {
        strategy: String,
        contact_id: Option<String>,
        payload: Value,
    },
    /// Every strategy was answered by the CRM but none succeeded
    Rejected { last: AttemptReport },
    /// The final attempt never reached the CRM
    Unreachable { last: AttemptReport },
}

pub struct Vbout {
    config: VboutConfig,
    client: Client,
}

impl Vbout {
    pub fn new(config: VboutConfig) -> Result<Self, ApiError> {
        if config.strategies.is_empty() {
            return Err(ApiError::VboutError(VboutError::NoStrategies));
        }

        for strategy in &config.strategies {
            strategy
                .validate()
                .map_err(|e| ApiError::VboutError(VboutError::InvalidStrategy(e)))?;
        }

        Url::parse(&config.base_url)
            .map_err(|e| ApiError::VboutError(VboutError::InvalidBaseUrl(e.to_string())))?;

        let timeout_seconds = config
            .api_timeout_seconds
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        if timeout_seconds == 0 {
            return Err(ApiError::VboutError(VboutError::InvalidTimeout));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(ApiError::NetworkError)?;

        Ok(Self { config, client })
    }

    /// Whether a usable API key was configured. The normal path refuses to
    /// start without one; this guards the invocation level as well.
    pub fn api_key_present(&self) -> bool {
        !self.config.api_key.trim().is_empty()
    }

    pub fn rejection_status(&self) -> RejectionStatus {
        self.config.rejection_status
    }

    /// Replace every occurrence of the API key so it never leaves the
    /// process in a log line or a reply body
    pub fn redact(&self, text: &str) -> String {
        if self.config.api_key.is_empty() {
            return text.to_string();
        }
        text.replace(&self.config.api_key, "[REDACTED]")
    }

    /// Submit a contact to the CRM, walking the strategy list strictly
    /// sequentially and stopping at the first success. On exhaustion the
    /// last attempt's outcome is what the caller gets.
    pub async fn add_contact(&self, contact: &ContactRecord) -> DeliveryResult {
        let url = self.endpoint("emailmarketing/addcontact");
        let params = self.contact_params(contact);

        let mut last: Option<AttemptReport> = None;
        for strategy in &self.config.strategies {
            info!("Submitting contact [{}] via [{strategy}]", contact.email);
            let report = self.attempt(strategy, &url, &params).await;

            if report.success {
                let contact_id = extract_contact_id(&report.detail);
                info!(
                    "Contact [{}] accepted via [{}]",
                    contact.email, report.strategy
                );
                return DeliveryResult::Delivered {
                    strategy: report.strategy,
                    contact_id,
                    payload: report.detail,
                };
            }

            warn!(
                "Strategy [{}] failed with status [{:?}]",
                report.strategy, report.status
            );
            debug!("CRM response detail: {}", report.detail);
            last = Some(report);
        }

        match last {
            Some(report) if report.status.is_some() => DeliveryResult::Rejected { last: report },
            Some(report) => DeliveryResult::Unreachable { last: report },
            // The strategy list is validated non-empty at construction
            None => DeliveryResult::Unreachable {
                last: AttemptReport {
                    strategy: String::new(),
                    status: None,
                    success: false,
                    detail: Value::String("no transport strategies configured".to_string()),
                },
            },
        }
    }

    /// Diagnostic sweep: hit the account-status endpoint with every
    /// configured strategy and report all outcomes. Never short-circuits.
    pub async fn probe(&self) -> Vec<AttemptReport> {
        let url = self.endpoint("user/me");
        let params = HashMap::new();

        let mut reports = Vec::with_capacity(self.config.strategies.len());
        for strategy in &self.config.strategies {
            info!("Probing CRM authentication via [{strategy}]");
            reports.push(self.attempt(strategy, &url, &params).await);
        }
        reports
    }

    async fn attempt(
        &self,
        strategy: &TransportStrategy,
        url: &str,
        params: &HashMap<String, String>,
    ) -> AttemptReport {
        let request = strategy.build_request(&self.client, url, &self.config.api_key, params);

        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let text = self.redact(&response.text().await.unwrap_or_default());
                let payload = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
                let success = response_indicates_success(status, &payload);
                AttemptReport {
                    strategy: strategy.to_string(),
                    status: Some(status),
                    success,
                    detail: payload,
                }
            }
            Err(e) => AttemptReport {
                strategy: strategy.to_string(),
                status: e.status().map(|s| s.as_u16()),
                success: false,
                detail: Value::String(self.redact(&e.to_string())),
            },
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn contact_params(&self, contact: &ContactRecord) -> HashMap<String, String> {
        let mut params = HashMap::new();
        params.insert("email".to_string(), contact.email.clone());
        params.insert("phone".to_string(), contact.phone.clone());
        params.insert("country".to_string(), contact.country.clone());
        if !contact.visitor_id.is_empty() {
            params.insert(
                self.config.visitor_field.clone(),
                contact.visitor_id.clone(),
            );
        }
        if !contact.property_url.is_empty() {
            params.insert(
                self.config.source_field.clone(),
                contact.property_url.clone(),
            );
        }
        if let Some(list_id) = &self.config.list_id {
            params.insert("listid".to_string(), list_id.clone());
        }
        params
    }
}

/// VBout nests its real status under `response.status`; a 200 without that
/// field (or with a non-JSON body) still counts as delivered
fn response_indicates_success(status: u16, payload: &Value) -> bool {
    if status != 200 {
        return false;
    }
    match walk(payload, &["response", "status"]).and_then(Value::as_str) {
        Some(s) => s.eq_ignore_ascii_case("success"),
        None => true,
    }
}

/// The id's location in the payload has never been pinned down, so probe the
/// shapes that have been seen. Absence is allowed.
fn extract_contact_id(payload: &Value) -> Option<String> {
    const PATHS: [&[&str]; 3] = [
        &["response", "data", "contact", "id"],
        &["response", "data", "id"],
        &["id"],
    ];

    for path in PATHS {
        match walk(payload, path) {
            Some(Value::String(id)) => return Some(id.clone()),
            Some(Value::Number(id)) => return Some(id.to_string()),
            _ => {}
        }
    }
    None
}

fn walk<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut value = payload;
    for key in path {
        value = value.get(key)?;
    }
    Some(value)
}
