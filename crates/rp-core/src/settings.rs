//! Paging settings and the runtime context handed to controllers

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::debounce::DEFAULT_DEBOUNCE;
use crate::dispatch::ConsumerDispatcher;
use crate::error::SettingsError;

/// Page size policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RowsPerPageRepr", into = "RowsPerPageRepr")]
pub enum RowsPerPage {
    /// Recompute from the consumer's capacity on every settle
    Dynamic,
    Fixed(usize),
}

impl Default for RowsPerPage {
    fn default() -> Self {
        RowsPerPage::Dynamic
    }
}

/// On-disk form: `"dynamic"` or a row count
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RowsPerPageRepr {
    Count(usize),
    Keyword(String),
}

impl TryFrom<RowsPerPageRepr> for RowsPerPage {
    type Error = String;

    fn try_from(repr: RowsPerPageRepr) -> Result<Self, Self::Error> {
        match repr {
            RowsPerPageRepr::Count(0) => Err("rows_per_page must be at least 1".to_string()),
            RowsPerPageRepr::Count(n) => Ok(RowsPerPage::Fixed(n)),
            RowsPerPageRepr::Keyword(k) if k.eq_ignore_ascii_case("dynamic") => {
                Ok(RowsPerPage::Dynamic)
            }
            RowsPerPageRepr::Keyword(k) => Err(format!("unknown rows_per_page '{}'", k)),
        }
    }
}

impl From<RowsPerPage> for RowsPerPageRepr {
    fn from(rows: RowsPerPage) -> Self {
        match rows {
            RowsPerPage::Dynamic => RowsPerPageRepr::Keyword("dynamic".to_string()),
            RowsPerPage::Fixed(n) => RowsPerPageRepr::Count(n),
        }
    }
}

/// Tunables shared by the page controller and the window cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingSettings {
    /// Settle interval for resize and scroll bursts
    #[serde(with = "humantime_duration")]
    pub debounce: Duration,

    /// Page size policy for page controllers
    pub rows_per_page: RowsPerPage,

    /// Fetch size used when a session is opened only to count rows
    pub count_fetch_size: usize,

    /// Thread name for window cache workers
    pub worker_name: String,
}

impl Default for PagingSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            rows_per_page: RowsPerPage::Dynamic,
            count_fetch_size: 1,
            worker_name: "window-cache".to_string(),
        }
    }
}

impl PagingSettings {
    /// Load settings from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let mut settings: PagingSettings = serde_json::from_str(text)?;
        settings.count_fetch_size = settings.count_fetch_size.max(1);
        Ok(settings)
    }

    /// Save settings as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SettingsError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Everything a controller needs from its environment
#[derive(Clone)]
pub struct PagingContext {
    pub settings: PagingSettings,

    /// Runtime that drives debounce timers
    pub runtime: tokio::runtime::Handle,

    /// The consumer thread's dispatcher
    pub dispatcher: Arc<ConsumerDispatcher>,
}

impl PagingContext {
    pub fn new(runtime: tokio::runtime::Handle, dispatcher: Arc<ConsumerDispatcher>) -> Self {
        Self {
            settings: PagingSettings::default(),
            runtime,
            dispatcher,
        }
    }

    pub fn with_settings(mut self, settings: PagingSettings) -> Self {
        self.settings = settings;
        self
    }
}
