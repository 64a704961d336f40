// src/settings.rs
use crate::dept_translate::DeptTranslate;
use crate::labor_model::erp_date;
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const LABOR_DATA_FILE_NAME: &str = "labordata.json";
pub const STATS_FILE_NAME: &str = "api_stats.json";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Environment error: {0}")]
    Env(#[from] envy::Error),
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Unknown time zone: {0}")]
    InvalidTimezone(String),
    #[error("DEPT_TRANSLATE is not a valid department table: {0}")]
    InvalidDeptTable(#[from] serde_json::Error),
    #[error("Invalid setting {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_refresh_interval_secs() -> u64 {
    5 * 60
}
fn default_slice_minutes() -> u32 {
    crate::time_grid::DEFAULT_SLICE_MINUTES
}
fn default_timezone() -> String {
    "US/Pacific".to_string()
}
fn default_data_path() -> PathBuf {
    PathBuf::from("data")
}
fn default_epicor_timeout_secs() -> u64 {
    30
}
fn default_shift_cache_secs() -> u64 {
    60 * 60
}
fn default_baq_labor_detail() -> String {
    "LP_LaborDtl".to_string()
}
fn default_baq_shift_data() -> String {
    "LP_ShiftData".to_string()
}
fn default_baq_job_standards() -> String {
    "LP_ActiveJobStandards".to_string()
}
fn default_baq_active_labor() -> String {
    "LP_ActiveLabor".to_string()
}
fn default_baq_not_clocked_in() -> String {
    "LP_EmpsNotClocked".to_string()
}

/// Service settings, read from the process environment (after `.env` is loaded).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_refresh_interval_secs")]
    pub labor_refresh_interval_secs: u64,
    #[serde(default = "default_slice_minutes")]
    pub slice_minutes: u32,
    #[serde(default = "default_timezone")]
    pub labor_timezone: String,
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    // TLS
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,

    /// JSON object overriding the built-in department table.
    pub dept_translate: Option<String>,
    /// Labor date override (`YYYY-MM-DD`); malformed values fall back to today.
    pub labor_date: Option<String>,
    /// Serve from a captured JSON day instead of the ERP.
    pub labor_fixture_path: Option<PathBuf>,

    // Epicor REST
    pub epicor_base_url: Option<String>,
    pub epicor_company: Option<String>,
    pub epicor_api_key: Option<String>,
    pub epicor_username: Option<String>,
    pub epicor_password: Option<String>,
    #[serde(default = "default_epicor_timeout_secs")]
    pub epicor_timeout_secs: u64,

    // Query caching
    #[serde(default)]
    pub query_cache_secs: u64,
    #[serde(default = "default_shift_cache_secs")]
    pub shift_cache_secs: u64,

    // BAQ identifiers
    #[serde(default = "default_baq_labor_detail")]
    pub baq_labor_detail: String,
    #[serde(default = "default_baq_shift_data")]
    pub baq_shift_data: String,
    #[serde(default = "default_baq_job_standards")]
    pub baq_job_standards: String,
    #[serde(default = "default_baq_active_labor")]
    pub baq_active_labor: String,
    #[serde(default = "default_baq_not_clocked_in")]
    pub baq_not_clocked_in: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let settings: Settings = envy::from_iter(vars)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.slice_minutes == 0 || self.slice_minutes > 60 {
            return Err(SettingsError::InvalidValue {
                name: "SLICE_MINUTES",
                reason: format!("{} is outside 1..=60", self.slice_minutes),
            });
        }
        if self.labor_refresh_interval_secs == 0 {
            return Err(SettingsError::InvalidValue {
                name: "LABOR_REFRESH_INTERVAL_SECS",
                reason: "must be positive".to_string(),
            });
        }
        self.timezone()?;
        self.dept_table()?;
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz, SettingsError> {
        self.labor_timezone
            .parse::<Tz>()
            .map_err(|_| SettingsError::InvalidTimezone(self.labor_timezone.clone()))
    }

    pub fn dept_table(&self) -> Result<DeptTranslate, SettingsError> {
        match &self.dept_translate {
            Some(raw) if !raw.trim().is_empty() => Ok(DeptTranslate::from_json(raw)?),
            _ => Ok(DeptTranslate::default()),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.labor_refresh_interval_secs)
    }

    pub fn labor_data_file(&self) -> PathBuf {
        self.data_path.join(LABOR_DATA_FILE_NAME)
    }

    pub fn stats_file(&self) -> PathBuf {
        self.data_path.join(STATS_FILE_NAME)
    }

    /// Both halves of the TLS pair, when configured.
    pub fn tls_paths(&self) -> Option<(PathBuf, PathBuf)> {
        match (&self.cert_path, &self.key_path) {
            (Some(cert), Some(key)) => Some((cert.clone(), key.clone())),
            _ => None,
        }
    }

    pub fn required(value: &Option<String>, name: &str) -> Result<String, SettingsError> {
        value
            .as_ref()
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .ok_or_else(|| SettingsError::MissingEnvVar(name.to_string()))
    }
}

/// Resolves the labor date to query. A malformed override is logged and today is used.
pub fn resolve_labor_date(raw: Option<&str>, today: NaiveDate) -> NaiveDate {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        None => today,
        Some(raw) => match erp_date::parse(raw) {
            Some(date) => {
                info!("Using labor date override {}", date);
                date
            }
            None => {
                error!("Invalid labor date '{}', using today ({})", raw, today);
                today
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_with_empty_environment() {
        let settings = Settings::from_vars(vars(&[])).expect("defaults are valid");
        assert_eq!(settings.bind_addr, "0.0.0.0:8080");
        assert_eq!(settings.labor_refresh_interval_secs, 300);
        assert_eq!(settings.slice_minutes, 5);
        assert_eq!(settings.timezone().unwrap(), chrono_tz::US::Pacific);
        assert_eq!(settings.query_cache_secs, 0);
        assert_eq!(settings.shift_cache_secs, 3600);
        assert_eq!(settings.labor_data_file(), PathBuf::from("data/labordata.json"));
        assert!(settings.tls_paths().is_none());
        assert_eq!(settings.dept_table().unwrap(), DeptTranslate::default());
    }

    #[test]
    fn environment_overrides_defaults() {
        let settings = Settings::from_vars(vars(&[
            ("LABOR_REFRESH_INTERVAL_SECS", "60"),
            ("SLICE_MINUTES", "15"),
            ("LABOR_TIMEZONE", "Europe/Stockholm"),
            ("DEPT_TRANSLATE", r#"{"100": ["WELD"]}"#),
            ("CERT_PATH", "cert.pem"),
            ("KEY_PATH", "key.pem"),
            ("EPICOR_COMPANY", "ACME"),
        ]))
        .unwrap();
        assert_eq!(settings.refresh_interval(), Duration::from_secs(60));
        assert_eq!(settings.slice_minutes, 15);
        assert_eq!(settings.dept_table().unwrap().opr_seq_for_dept("WELD"), Some(100));
        assert!(settings.tls_paths().is_some());
        assert_eq!(Settings::required(&settings.epicor_company, "EPICOR_COMPANY").unwrap(), "ACME");
        assert!(matches!(
            Settings::required(&settings.epicor_base_url, "EPICOR_BASE_URL"),
            Err(SettingsError::MissingEnvVar(name)) if name == "EPICOR_BASE_URL"
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            Settings::from_vars(vars(&[("LABOR_TIMEZONE", "Mars/Olympus")])),
            Err(SettingsError::InvalidTimezone(_))
        ));
        assert!(matches!(
            Settings::from_vars(vars(&[("SLICE_MINUTES", "0")])),
            Err(SettingsError::InvalidValue { name: "SLICE_MINUTES", .. })
        ));
        assert!(matches!(
            Settings::from_vars(vars(&[("DEPT_TRANSLATE", "[1, 2]")])),
            Err(SettingsError::InvalidDeptTable(_))
        ));
    }

    #[test]
    fn malformed_labor_date_falls_back_to_today() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        assert_eq!(resolve_labor_date(None, today), today);
        assert_eq!(resolve_labor_date(Some("  "), today), today);
        assert_eq!(resolve_labor_date(Some("05/07/2024"), today), today);
        assert_eq!(
            resolve_labor_date(Some("2024-05-03"), today),
            NaiveDate::from_ymd_opt(2024, 5, 3).unwrap()
        );
    }
}
