//! Runtime options read from `APIGEN_*` environment variables.

use crate::error::ConfigError;
use std::env;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct EagerLoadingSettings {
    pub max_joins: usize,
    pub force_eager: bool,
    pub fetch_partial: bool,
}

impl Default for EagerLoadingSettings {
    fn default() -> Self {
        EagerLoadingSettings {
            max_joins: 30,
            force_eager: true,
            fetch_partial: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PaginationSettings {
    pub enabled: bool,
    pub client_enabled: bool,
    pub client_items_per_page: bool,
    pub items_per_page: i64,
    pub maximum_items_per_page: Option<i64>,
    pub page_parameter_name: String,
    pub enabled_parameter_name: String,
    pub items_per_page_parameter_name: String,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        PaginationSettings {
            enabled: true,
            client_enabled: false,
            client_items_per_page: false,
            items_per_page: 30,
            maximum_items_per_page: None,
            page_parameter_name: "page".into(),
            enabled_parameter_name: "pagination".into(),
            items_per_page_parameter_name: "itemsPerPage".into(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Settings {
    pub eager_loading: EagerLoadingSettings,
    pub pagination: PaginationSettings,
    /// Default direction applied to single-field identifiers when a resource declares no order.
    pub default_order: Option<String>,
}

impl Settings {
    /// `from_env` after loading a `.env` file from the working directory, if there is one.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_env()
    }

    /// Defaults overridden by whatever `APIGEN_*` variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut s = Settings::default();
        if let Some(v) = parse_var("APIGEN_MAX_JOINS")? {
            s.eager_loading.max_joins = v;
        }
        if let Some(v) = parse_var("APIGEN_FORCE_EAGER")? {
            s.eager_loading.force_eager = v;
        }
        if let Some(v) = parse_var("APIGEN_FETCH_PARTIAL")? {
            s.eager_loading.fetch_partial = v;
        }
        if let Ok(v) = env::var("APIGEN_DEFAULT_ORDER") {
            s.default_order = Some(v.to_uppercase());
        }
        if let Some(v) = parse_var("APIGEN_PAGINATION_ENABLED")? {
            s.pagination.enabled = v;
        }
        if let Some(v) = parse_var("APIGEN_PAGINATION_CLIENT_ENABLED")? {
            s.pagination.client_enabled = v;
        }
        if let Some(v) = parse_var("APIGEN_PAGINATION_CLIENT_ITEMS_PER_PAGE")? {
            s.pagination.client_items_per_page = v;
        }
        if let Some(v) = parse_var("APIGEN_PAGINATION_ITEMS_PER_PAGE")? {
            s.pagination.items_per_page = v;
        }
        if let Some(v) = parse_var("APIGEN_PAGINATION_MAXIMUM_ITEMS_PER_PAGE")? {
            s.pagination.maximum_items_per_page = Some(v);
        }
        if let Ok(v) = env::var("APIGEN_PAGINATION_PAGE_PARAMETER_NAME") {
            s.pagination.page_parameter_name = v;
        }
        if let Ok(v) = env::var("APIGEN_PAGINATION_ENABLED_PARAMETER_NAME") {
            s.pagination.enabled_parameter_name = v;
        }
        if let Ok(v) = env::var("APIGEN_PAGINATION_ITEMS_PER_PAGE_PARAMETER_NAME") {
            s.pagination.items_per_page_parameter_name = v;
        }
        Ok(s)
    }
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Load(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(None),
    }
}
