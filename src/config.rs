//! Persistent configuration model, defaults and startup validation.

use std::path::PathBuf;

use thiserror::Error;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Candidate quality rules.
    pub filter: FilterConfig,
    #[serde(default)]
    /// Query title templates per place kind.
    pub variants: VariantsConfig,
    #[serde(default)]
    /// Politeness delays and request rate.
    pub pacing: PacingConfig,
    #[serde(default)]
    /// Current-image source classification.
    pub freshness: FreshnessConfig,
    #[serde(default)]
    /// Media service endpoints and HTTP behavior.
    pub service: ServiceConfig,
    #[serde(default)]
    /// Place store location.
    pub store: StoreConfig,
}

/// Named aspect-ratio band.
#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterProfile {
    /// Landscape band 1.4 to 2.0.
    #[default]
    Strict,
    /// Landscape band 1.3 to 2.2.
    Permissive,
}

impl FilterProfile {
    pub fn aspect_band(self) -> (f64, f64) {
        match self {
            Self::Strict => (1.4, 2.0),
            Self::Permissive => (1.3, 2.2),
        }
    }
}

impl std::str::FromStr for FilterProfile {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "permissive" => Ok(Self::Permissive),
            other => Err(format!("unknown filter profile '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FilterConfig {
    #[serde(default = "default_min_width")]
    pub min_width: u32,
    #[serde(default = "default_min_height")]
    pub min_height: u32,
    #[serde(default)]
    pub profile: FilterProfile,
    /// Overrides the profile's lower bound when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio_min: Option<f64>,
    /// Overrides the profile's upper bound when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio_max: Option<f64>,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_url_blocklist")]
    pub url_blocklist: Vec<String>,
    #[serde(default = "default_title_blocklist")]
    pub title_blocklist: Vec<String>,
}

impl FilterConfig {
    /// Effective aspect-ratio band: explicit bounds win over the profile.
    pub fn aspect_band(&self) -> (f64, f64) {
        let (profile_min, profile_max) = self.profile.aspect_band();
        (
            self.aspect_ratio_min.unwrap_or(profile_min),
            self.aspect_ratio_max.unwrap_or(profile_max),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct VariantsConfig {
    /// Templates with a `{name}` placeholder, tried in order.
    #[serde(default = "default_country_templates")]
    pub country_templates: Vec<String>,
    /// Templates with `{name}` and optional `{country}` placeholders.
    #[serde(default = "default_city_templates")]
    pub city_templates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct PacingConfig {
    #[serde(default = "default_inter_place_delay_ms")]
    pub inter_place_delay_ms: u64,
    #[serde(default)]
    pub inter_variant_delay_ms: u64,
    #[serde(default = "default_max_requests_per_second")]
    pub max_requests_per_second: u32,
    /// Lifetime of memoized dimension lookups within one batch.
    #[serde(default = "default_dimension_cache_ttl_secs")]
    pub dimension_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct FreshnessConfig {
    /// Host fragments identifying images already sourced from the encyclopedia.
    #[serde(default = "default_encyclopedia_markers")]
    pub encyclopedia_markers: Vec<String>,
    /// Host fragments identifying lower-priority stock photos.
    #[serde(default = "default_stock_markers")]
    pub stock_markers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ServiceConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_rest_base_url")]
    pub rest_base_url: String,
    #[serde(default = "default_action_api_url")]
    pub action_api_url: String,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
pub struct StoreConfig {
    /// SQLite database path; the platform data directory is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

/// Fatal startup errors raised before any place is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write default config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_min_width() -> u32 {
    800
}

fn default_min_height() -> u32 {
    500
}

fn default_allowed_extensions() -> Vec<String> {
    to_strings(&[".jpg", ".jpeg"])
}

fn default_url_blocklist() -> Vec<String> {
    to_strings(&[
        "flag",
        "coat_of_arms",
        "emblem",
        "seal",
        "logo",
        "brand",
        "icon",
        "symbol",
        "map_of",
        "location_map",
        "locator",
        "blank_map",
    ])
}

fn default_title_blocklist() -> Vec<String> {
    to_strings(&[
        "dance",
        "dancing",
        "costume",
        "clothing",
        "dress",
        "people",
        "person",
        "man",
        "woman",
        "portrait",
        "ceremony",
        "ritual",
        "wedding",
        "festival",
        "performance",
        "traditional",
        "folk",
        "logo",
        "brand",
        "icon",
        "diagram",
        "chart",
        "graph",
    ])
}

fn default_country_templates() -> Vec<String> {
    to_strings(&[
        "Tourism in {name}",
        "Culture of {name}",
        "History of {name}",
        "Geography of {name}",
        "{name}",
    ])
}

fn default_city_templates() -> Vec<String> {
    to_strings(&[
        "{name}",
        "{name}, {country}",
        "Tourism in {name}",
        "{name} skyline",
        "Architecture of {name}",
    ])
}

fn default_inter_place_delay_ms() -> u64 {
    1_000
}

fn default_max_requests_per_second() -> u32 {
    5
}

fn default_dimension_cache_ttl_secs() -> u64 {
    60 * 60
}

fn default_encyclopedia_markers() -> Vec<String> {
    to_strings(&["upload.wikimedia.org", "wikipedia.org", "wikimedia.org"])
}

fn default_stock_markers() -> Vec<String> {
    to_strings(&["unsplash.com", "pexels.com", "pixabay.com"])
}

fn default_user_agent() -> String {
    format!(
        "placeshot/{} (hero image sourcing; contact: site maintainers)",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_rest_base_url() -> String {
    "https://en.wikipedia.org/api/rest_v1".to_string()
}

fn default_action_api_url() -> String {
    "https://commons.wikimedia.org/w/api.php".to_string()
}

fn default_read_timeout_ms() -> u64 {
    15_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_width: default_min_width(),
            min_height: default_min_height(),
            profile: FilterProfile::default(),
            aspect_ratio_min: None,
            aspect_ratio_max: None,
            allowed_extensions: default_allowed_extensions(),
            url_blocklist: default_url_blocklist(),
            title_blocklist: default_title_blocklist(),
        }
    }
}

impl Default for VariantsConfig {
    fn default() -> Self {
        Self {
            country_templates: default_country_templates(),
            city_templates: default_city_templates(),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            inter_place_delay_ms: default_inter_place_delay_ms(),
            inter_variant_delay_ms: 0,
            max_requests_per_second: default_max_requests_per_second(),
            dimension_cache_ttl_secs: default_dimension_cache_ttl_secs(),
        }
    }
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            encyclopedia_markers: default_encyclopedia_markers(),
            stock_markers: default_stock_markers(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            rest_base_url: default_rest_base_url(),
            action_api_url: default_action_api_url(),
            read_timeout_ms: default_read_timeout_ms(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

fn ensure_entries(label: &str, values: &[String]) -> Result<(), ConfigError> {
    if values.is_empty() {
        return Err(ConfigError::Invalid(format!("{label} must not be empty")));
    }
    if values.iter().any(|value| value.trim().is_empty()) {
        return Err(ConfigError::Invalid(format!(
            "{label} must not contain blank entries"
        )));
    }
    Ok(())
}

impl Config {
    /// Rejects configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let filter = &self.filter;
        if filter.min_width == 0 || filter.min_height == 0 {
            return Err(ConfigError::Invalid(
                "filter.min_width and filter.min_height must be positive".to_string(),
            ));
        }
        let (aspect_min, aspect_max) = filter.aspect_band();
        if !aspect_min.is_finite() || !aspect_max.is_finite() || aspect_min <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "aspect ratio bounds must be positive numbers (got {aspect_min}..{aspect_max})"
            )));
        }
        if aspect_min > aspect_max {
            return Err(ConfigError::Invalid(format!(
                "filter.aspect_ratio_min ({aspect_min}) exceeds filter.aspect_ratio_max ({aspect_max})"
            )));
        }
        ensure_entries("filter.allowed_extensions", &filter.allowed_extensions)?;
        ensure_entries("filter.url_blocklist", &filter.url_blocklist)?;
        ensure_entries("filter.title_blocklist", &filter.title_blocklist)?;
        ensure_entries("variants.country_templates", &self.variants.country_templates)?;
        ensure_entries("variants.city_templates", &self.variants.city_templates)?;
        if let Some(template) = self
            .variants
            .country_templates
            .iter()
            .find(|template| !template.contains("{name}"))
        {
            return Err(ConfigError::Invalid(format!(
                "country template '{template}' is missing the {{name}} placeholder"
            )));
        }
        if self.pacing.max_requests_per_second == 0 {
            return Err(ConfigError::Invalid(
                "pacing.max_requests_per_second must be positive".to_string(),
            ));
        }
        if self.service.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "service.user_agent is required by the media service".to_string(),
            ));
        }
        if self.service.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "service.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
