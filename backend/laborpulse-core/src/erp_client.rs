// src/erp_client.rs
use crate::labor_model::{
    ActiveAssignmentRow, JobStandardRow, LaborDtlRow, NotClockedInRow, ShiftRow,
};
use crate::labor_pipeline::LaborInputs;
use crate::query_cache::QueryCache;
use crate::settings::{Settings, SettingsError};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

const API_KEY_HEADER: &str = "X-API-Key";
const LABOR_DATE_PARAM: &str = "ClockInDate";

#[derive(Error, Debug)]
pub enum ErpError {
    #[error("HTTP request failed")]
    Request(#[from] reqwest::Error),

    #[error("JSON processing error")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error")]
    UrlParse(#[from] url::ParseError),

    #[error("ERP API error: Status={status}, Message='{message}'")]
    ApiError { status: StatusCode, message: String },

    #[error("File I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

fn io_context<S: Into<String>>(source: std::io::Error, context: S) -> ErpError {
    ErpError::Io {
        source,
        context: context.into(),
    }
}

/// The five ERP collections one refresh pass needs.
#[async_trait]
pub trait LaborSource: Send + Sync {
    async fn fetch_labor_intervals(&self, date: NaiveDate) -> Result<Vec<LaborDtlRow>, ErpError>;
    async fn fetch_shift_windows(&self) -> Result<Vec<ShiftRow>, ErpError>;
    async fn fetch_active_job_standards(&self) -> Result<Vec<JobStandardRow>, ErpError>;
    async fn fetch_active_labor_assignments(&self) -> Result<Vec<ActiveAssignmentRow>, ErpError>;
    async fn fetch_not_clocked_in(&self, date: NaiveDate) -> Result<Vec<NotClockedInRow>, ErpError>;

    fn describe(&self) -> String;
}

/// Fetches everything for one pass. The first failing query fails the whole fetch.
pub async fn fetch_inputs(source: &dyn LaborSource, date: NaiveDate) -> Result<LaborInputs, ErpError> {
    let shift_rows = source.fetch_shift_windows().await?;
    let labor_rows = source.fetch_labor_intervals(date).await?;
    let not_clocked_in = source.fetch_not_clocked_in(date).await?;
    let job_standards = source.fetch_active_job_standards().await?;
    let active_assignments = source.fetch_active_labor_assignments().await?;
    debug!(
        "Fetched {} labor rows, {} shift rows, {} standards, {} assignments, {} unclocked headers",
        labor_rows.len(),
        shift_rows.len(),
        job_standards.len(),
        active_assignments.len(),
        not_clocked_in.len()
    );
    Ok(LaborInputs {
        labor_rows,
        shift_rows,
        job_standards,
        active_assignments,
        not_clocked_in,
    })
}

// --- Epicor REST (BAQ service) ---

#[derive(Clone, Debug)]
pub struct EpicorConfig {
    pub base_url: String,
    pub company: String,
    pub api_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub query_cache_ttl: Duration,
    pub shift_cache_ttl: Duration,
    pub baq_labor_detail: String,
    pub baq_shift_data: String,
    pub baq_job_standards: String,
    pub baq_active_labor: String,
    pub baq_not_clocked_in: String,
}

impl EpicorConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        Ok(Self {
            base_url: Settings::required(&settings.epicor_base_url, "EPICOR_BASE_URL")?,
            company: Settings::required(&settings.epicor_company, "EPICOR_COMPANY")?,
            api_key: settings.epicor_api_key.clone(),
            username: settings.epicor_username.clone(),
            password: settings.epicor_password.clone(),
            timeout: Duration::from_secs(settings.epicor_timeout_secs),
            query_cache_ttl: Duration::from_secs(settings.query_cache_secs),
            shift_cache_ttl: Duration::from_secs(settings.shift_cache_secs),
            baq_labor_detail: settings.baq_labor_detail.clone(),
            baq_shift_data: settings.baq_shift_data.clone(),
            baq_job_standards: settings.baq_job_standards.clone(),
            baq_active_labor: settings.baq_active_labor.clone(),
            baq_not_clocked_in: settings.baq_not_clocked_in.clone(),
        })
    }
}

// OData envelope around BAQ results
#[derive(Debug, Deserialize)]
struct ODataResponse<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ODataErrorPayload {
    #[serde(rename = "ErrorMessage", alias = "message")]
    error_message: Option<String>,
}

pub struct EpicorClient {
    http_client: Client,
    config: EpicorConfig,
    cache: Arc<QueryCache>,
}

impl EpicorClient {
    pub fn new(config: EpicorConfig, cache: Arc<QueryCache>) -> Result<Self, ErpError> {
        let http_client = Client::builder().timeout(config.timeout).build()?;
        Url::parse(&config.base_url)?;
        if config.company.trim().is_empty() {
            return Err(ErpError::ConfigError("company must not be empty".to_string()));
        }
        Ok(Self {
            http_client,
            config,
            cache,
        })
    }

    pub fn baq_url(&self, baq: &str) -> Result<Url, ErpError> {
        let url = format!(
            "{}/api/v2/odata/{}/BaqSvc/{}/Data",
            self.config.base_url.trim_end_matches('/'),
            self.config.company,
            baq
        );
        Ok(Url::parse(&url)?)
    }

    fn build_request(&self, baq: &str, params: &[(&str, String)]) -> Result<RequestBuilder, ErpError> {
        let url = self.baq_url(baq)?;
        let mut request = self
            .http_client
            .get(url)
            .header(ACCEPT, "application/json")
            .query(params);
        if let Some(api_key) = &self.config.api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }
        if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_deref());
        }
        Ok(request)
    }

    async fn send_and_deserialize<T: DeserializeOwned>(
        &self,
        request_builder: RequestBuilder,
        baq: &str,
    ) -> Result<Vec<T>, ErpError> {
        let response = request_builder.send().await.map_err(|e| {
            error!("HTTP execution failed for BAQ '{}': {}", baq, e);
            ErpError::Request(e)
        })?;

        let status = response.status();
        debug!("Received response for BAQ '{}': Status={}", baq, status);

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error body: {}", e));
            error!("ERP API Error Response: Status={}, Body='{}' for BAQ {}", status, error_body, baq);
            let message = match serde_json::from_str::<ODataErrorPayload>(&error_body) {
                Ok(ODataErrorPayload {
                    error_message: Some(message),
                }) => message,
                _ => error_body,
            };
            return Err(ErpError::ApiError { status, message });
        }

        let bytes = response.bytes().await?;
        let envelope: ODataResponse<T> = serde_json::from_slice(&bytes).map_err(|e| {
            error!("JSON deserialization failed for BAQ '{}': {}", baq, e);
            ErpError::Json(e)
        })?;
        Ok(envelope.value)
    }

    async fn query<T>(&self, baq: &str, params: Vec<(&str, String)>, ttl: Duration) -> Result<Vec<T>, ErpError>
    where
        T: DeserializeOwned + Serialize,
    {
        let key = QueryCache::generate_cache_key(baq, &params);
        self.cache
            .get_or_fetch(&key, ttl, || async {
                let request = self.build_request(baq, &params)?;
                self.send_and_deserialize(request, baq).await
            })
            .await
    }
}

#[async_trait]
impl LaborSource for EpicorClient {
    async fn fetch_labor_intervals(&self, date: NaiveDate) -> Result<Vec<LaborDtlRow>, ErpError> {
        let params = vec![(LABOR_DATE_PARAM, date.format("%Y-%m-%d").to_string())];
        self.query(&self.config.baq_labor_detail, params, self.config.query_cache_ttl)
            .await
    }

    async fn fetch_shift_windows(&self) -> Result<Vec<ShiftRow>, ErpError> {
        self.query(&self.config.baq_shift_data, Vec::new(), self.config.shift_cache_ttl)
            .await
    }

    async fn fetch_active_job_standards(&self) -> Result<Vec<JobStandardRow>, ErpError> {
        self.query(&self.config.baq_job_standards, Vec::new(), self.config.query_cache_ttl)
            .await
    }

    async fn fetch_active_labor_assignments(&self) -> Result<Vec<ActiveAssignmentRow>, ErpError> {
        self.query(&self.config.baq_active_labor, Vec::new(), self.config.query_cache_ttl)
            .await
    }

    async fn fetch_not_clocked_in(&self, date: NaiveDate) -> Result<Vec<NotClockedInRow>, ErpError> {
        let params = vec![(LABOR_DATE_PARAM, date.format("%Y-%m-%d").to_string())];
        self.query(&self.config.baq_not_clocked_in, params, self.config.query_cache_ttl)
            .await
    }

    fn describe(&self) -> String {
        format!("Epicor {} ({})", self.config.base_url, self.config.company)
    }
}

// --- Captured day on disk ---

/// Serves a captured day from a JSON file shaped like [`LaborInputs`].
/// Labor rows are filtered by the requested date.
#[derive(Debug, Clone)]
pub struct FixtureSource {
    path: PathBuf,
    inputs: LaborInputs,
}

impl FixtureSource {
    pub fn from_path(path: &Path) -> Result<Self, ErpError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| io_context(e, format!("Failed to read labor fixture: {:?}", path)))?;
        let inputs: LaborInputs = serde_json::from_str(&raw)?;
        info!(
            "Loaded labor fixture {} with {} labor rows",
            path.display(),
            inputs.labor_rows.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            inputs,
        })
    }

    pub fn from_inputs(inputs: LaborInputs) -> Self {
        Self {
            path: PathBuf::from("<memory>"),
            inputs,
        }
    }
}

#[async_trait]
impl LaborSource for FixtureSource {
    async fn fetch_labor_intervals(&self, date: NaiveDate) -> Result<Vec<LaborDtlRow>, ErpError> {
        Ok(self
            .inputs
            .labor_rows
            .iter()
            .filter(|row| row.clock_in_date == date)
            .cloned()
            .collect())
    }

    async fn fetch_shift_windows(&self) -> Result<Vec<ShiftRow>, ErpError> {
        Ok(self.inputs.shift_rows.clone())
    }

    async fn fetch_active_job_standards(&self) -> Result<Vec<JobStandardRow>, ErpError> {
        Ok(self.inputs.job_standards.clone())
    }

    async fn fetch_active_labor_assignments(&self) -> Result<Vec<ActiveAssignmentRow>, ErpError> {
        Ok(self.inputs.active_assignments.clone())
    }

    async fn fetch_not_clocked_in(&self, _date: NaiveDate) -> Result<Vec<NotClockedInRow>, ErpError> {
        Ok(self.inputs.not_clocked_in.clone())
    }

    fn describe(&self) -> String {
        format!("fixture {}", self.path.display())
    }
}
