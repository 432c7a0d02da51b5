//! Wikipedia / Wikimedia Commons adapter backed by `ureq`.
//!
//! Media lists and page summaries come from the Wikipedia REST API; true file
//! sizes come from the Commons action API (`prop=imageinfo`).

use std::cmp::Ordering;
use std::io::Read;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::{debug, info};
use serde_json::Value;

use crate::config::{PacingConfig, ServiceConfig};
use crate::sources::{CandidateSource, DimensionLookup, RawCandidate};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RATE_LIMIT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HttpFailureKind {
    Timeout,
    RateLimited,
    Hard,
    NotFound,
}

impl HttpFailureKind {
    const ALL: [Self; 4] = [Self::Timeout, Self::RateLimited, Self::Hard, Self::NotFound];

    fn prefix(self) -> &'static str {
        match self {
            Self::Timeout => "timeout:",
            Self::RateLimited => "rate_limit:",
            Self::Hard => "hard:",
            Self::NotFound => "not_found:",
        }
    }

    fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited)
    }
}

/// Media service client shared by candidate fetching and dimension lookups.
pub struct WikimediaClient {
    http_client: ureq::Agent,
    user_agent: String,
    rest_base_url: String,
    action_api_url: String,
    max_attempts: u32,
    retry_base_delay: Duration,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl WikimediaClient {
    /// Creates a client from validated service and pacing settings.
    pub fn new(service: &ServiceConfig, pacing: &PacingConfig) -> Self {
        let read_timeout = Duration::from_millis(service.read_timeout_ms.max(1));
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(read_timeout)
            .timeout_write(read_timeout)
            .build();
        let per_second = NonZeroU32::new(pacing.max_requests_per_second).unwrap_or(NonZeroU32::MIN);

        Self {
            http_client,
            user_agent: service.user_agent.trim().to_string(),
            rest_base_url: service.rest_base_url.trim_end_matches('/').to_string(),
            action_api_url: service.action_api_url.trim().to_string(),
            max_attempts: service.max_attempts.max(1),
            retry_base_delay: Duration::from_millis(service.retry_base_delay_ms),
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
        }
    }

    /// Failure reasons carry their kind as a prefix so retry decisions survive
    /// the `String` error channel.
    fn failure_reason(kind: HttpFailureKind, message: impl Into<String>) -> String {
        format!("{}{}", kind.prefix(), message.into())
    }

    fn is_retryable_reason(reason: &str) -> bool {
        HttpFailureKind::ALL
            .iter()
            .any(|kind| kind.is_retryable() && reason.starts_with(kind.prefix()))
    }

    fn classify_status(code: u16) -> HttpFailureKind {
        match code {
            429 => HttpFailureKind::RateLimited,
            408 | 500 | 502 | 503 | 504 => HttpFailureKind::Timeout,
            _ => HttpFailureKind::Hard,
        }
    }

    fn classify_ureq_failure(error: &ureq::Error) -> HttpFailureKind {
        match error {
            ureq::Error::Status(code, _) => Self::classify_status(*code),
            ureq::Error::Transport(transport) => {
                let lowered = transport.to_string().to_ascii_lowercase();
                if lowered.contains("timed out") || lowered.contains("timeout") {
                    HttpFailureKind::Timeout
                } else {
                    HttpFailureKind::Hard
                }
            }
        }
    }

    fn classify_io_timeout(error: &std::io::Error) -> bool {
        matches!(
            error.kind(),
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
        ) || error.to_string().to_ascii_lowercase().contains("timed out")
    }

    fn backoff_delay(base_delay: Duration, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(6);
        let multiplier = 1u32 << exponent;
        base_delay
            .checked_mul(multiplier)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }

    fn wait_for_rate_limit_slot(&self) {
        while self.limiter.check().is_err() {
            std::thread::sleep(RATE_LIMIT_POLL_INTERVAL);
        }
    }

    fn execute_with_backoff<T, F>(&self, label: &str, mut operation: F) -> Result<T, String>
    where
        F: FnMut(&Self) -> Result<T, String>,
    {
        let mut attempt = 1u32;
        loop {
            match operation(self) {
                Ok(value) => return Ok(value),
                Err(error_reason)
                    if Self::is_retryable_reason(&error_reason) && attempt < self.max_attempts =>
                {
                    let backoff = Self::backoff_delay(self.retry_base_delay, attempt);
                    info!(
                        "Wikimedia: {} attempt {} failed ({}), retrying in {:?}",
                        label, attempt, error_reason, backoff
                    );
                    std::thread::sleep(backoff);
                    attempt = attempt.saturating_add(1);
                }
                Err(error_reason) => return Err(error_reason),
            }
        }
    }

    fn http_get_json_once(&self, url: &str) -> Result<Value, String> {
        self.wait_for_rate_limit_slot();
        let response = self
            .http_client
            .get(url)
            .set("User-Agent", &self.user_agent)
            .set("Accept", "application/json")
            .call()
            .map_err(|error| {
                Self::failure_reason(
                    Self::classify_ureq_failure(&error),
                    format!("Request failed: {error}"),
                )
            })?;
        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|error| {
                let kind = if Self::classify_io_timeout(&error) {
                    HttpFailureKind::Timeout
                } else {
                    HttpFailureKind::Hard
                };
                Self::failure_reason(kind, format!("Failed to read response: {error}"))
            })?;
        serde_json::from_str(&body)
            .map_err(|error| {
                Self::failure_reason(HttpFailureKind::Hard, format!("Invalid JSON response: {error}"))
            })
    }

    fn http_get_json(&self, url: &str, label: &str) -> Result<Value, String> {
        debug!("Wikimedia: GET {}", url);
        self.execute_with_backoff(label, |client| client.http_get_json_once(url))
    }

    fn encode_page_title(title: &str) -> String {
        let underscored = title.split_whitespace().collect::<Vec<_>>().join("_");
        urlencoding::encode(&underscored).into_owned()
    }

    fn media_list_url(&self, title: &str) -> String {
        format!(
            "{}/page/media-list/{}",
            self.rest_base_url,
            Self::encode_page_title(title)
        )
    }

    fn summary_url(&self, title: &str) -> String {
        format!(
            "{}/page/summary/{}",
            self.rest_base_url,
            Self::encode_page_title(title)
        )
    }

    fn imageinfo_url(&self, file_name: &str) -> String {
        let file_title = format!("File:{}", file_name.trim().replace(' ', "_"));
        format!(
            "{}?action=query&titles={}&prop=imageinfo&iiprop=size&format=json&formatversion=2&maxlag=5",
            self.action_api_url,
            urlencoding::encode(&file_title)
        )
    }
}

fn positive_u32(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .filter(|value| *value > 0)
        .and_then(|value| u32::try_from(value).ok())
}

fn declared_size(value: &Value) -> Option<(u32, u32)> {
    Some((positive_u32(&value["width"])?, positive_u32(&value["height"])?))
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|value| !value.is_empty())
}

fn srcset_scale(entry: &Value) -> f64 {
    entry["scale"]
        .as_str()
        .and_then(|scale| scale.trim().trim_end_matches('x').parse::<f64>().ok())
        .unwrap_or(1.0)
}

fn compare_renditions(left: &Value, right: &Value) -> Ordering {
    let left_width = left["width"].as_u64().unwrap_or(0);
    let right_width = right["width"].as_u64().unwrap_or(0);
    left_width.cmp(&right_width).then_with(|| {
        srcset_scale(left)
            .partial_cmp(&srcset_scale(right))
            .unwrap_or(Ordering::Equal)
    })
}

/// Largest rendition of one media-list item: the original when listed,
/// otherwise the widest (or highest-scale) srcset entry.
fn largest_rendition(item: &Value) -> Option<(String, Option<(u32, u32)>)> {
    if let Some(source) = non_empty_str(&item["original"]["source"]) {
        return Some((source.to_string(), declared_size(&item["original"])));
    }
    let best = item["srcset"]
        .as_array()?
        .iter()
        .filter(|entry| non_empty_str(&entry["src"]).is_some())
        .max_by(|left, right| compare_renditions(left, right))?;
    let src = non_empty_str(&best["src"])?;
    Some((src.to_string(), declared_size(best)))
}

fn parse_media_list(value: &Value) -> Vec<RawCandidate> {
    let Some(items) = value["items"].as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter(|item| item["type"].as_str() == Some("image"))
        .filter_map(|item| {
            let (url, size) = largest_rendition(item)?;
            let title = item["title"].as_str().unwrap_or_default().trim();
            Some(RawCandidate::new(&url, title, size))
        })
        .collect()
}

/// Lead image of a page summary. The page title describes the article, not the
/// file, so the candidate title is left empty.
fn parse_summary_image(value: &Value) -> Option<RawCandidate> {
    ["originalimage", "thumbnail"].iter().find_map(|key| {
        let image = &value[*key];
        let source = non_empty_str(&image["source"])?;
        Some(RawCandidate::new(source, "", declared_size(image)))
    })
}

fn parse_imageinfo_size(value: &Value) -> Option<(u32, u32)> {
    let pages: Vec<&Value> = match &value["query"]["pages"] {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => Vec::new(),
    };
    pages
        .into_iter()
        .filter(|page| page.get("missing").is_none())
        .find_map(|page| declared_size(&page["imageinfo"][0]))
}

impl CandidateSource for WikimediaClient {
    fn fetch_media_list(&self, title: &str) -> Result<Vec<RawCandidate>, String> {
        let url = self.media_list_url(title);
        let parsed = self.http_get_json(&url, "media-list")?;
        Ok(parse_media_list(&parsed))
    }

    fn fetch_summary_image(&self, title: &str) -> Result<Option<RawCandidate>, String> {
        let url = self.summary_url(title);
        let parsed = self.http_get_json(&url, "page summary")?;
        Ok(parse_summary_image(&parsed))
    }
}

impl DimensionLookup for WikimediaClient {
    fn lookup_dimensions(&self, file_name: &str) -> Result<(u32, u32), String> {
        let url = self.imageinfo_url(file_name);
        let parsed = self.http_get_json(&url, "imageinfo")?;
        parse_imageinfo_size(&parsed).ok_or_else(|| {
            Self::failure_reason(
                HttpFailureKind::NotFound,
                format!("no imageinfo size for '{file_name}'"),
            )
        })
    }
}
