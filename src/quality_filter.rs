//! Rule-based accept/reject predicate for hero image candidates.
//!
//! Rules run in a fixed order and the first failing rule decides the
//! rejection reason. There is no scoring: an image either passes every rule
//! or it does not.

use crate::config::FilterConfig;
use crate::image_url::{file_name_from_url, path_without_query};
use crate::protocol::{FilterDecision, FilterRule};

/// Terms this short only match whole words, so "man" does not reject "Germany".
const WORD_BOUNDARY_MAX_TERM_LEN: usize = 3;

/// Longest ending a longer term may carry and still match a title word, so
/// "dance" rejects "dancers" but "brand" leaves "Brandenburg" alone.
const MAX_INFLECTION_LEN: usize = 3;

#[derive(Debug, Clone)]
pub struct QualityFilter {
    min_width: u32,
    min_height: u32,
    aspect_min: f64,
    aspect_max: f64,
    allowed_extensions: Vec<String>,
    url_blocklist: Vec<String>,
    title_blocklist: Vec<String>,
}

fn lowered_terms(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
        .collect()
}

fn normalize_extension(value: &str) -> String {
    let trimmed = value.trim().to_lowercase();
    if trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{trimmed}")
    }
}

fn title_tokens(title: &str) -> impl Iterator<Item = &str> {
    title
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
}

/// Matches a blocklist term against the title's words. Multi-word terms match
/// as a phrase; single words match a word that starts with the term, never a
/// word that merely contains it ("graph" leaves "photograph" alone).
fn title_contains_term(title: &str, term: &str) -> bool {
    if term.contains(char::is_whitespace) {
        return title.contains(term);
    }
    if term.chars().count() <= WORD_BOUNDARY_MAX_TERM_LEN {
        return title_tokens(title).any(|token| token == term);
    }
    title_tokens(title).any(|token| {
        token
            .strip_prefix(term)
            .is_some_and(|ending| ending.chars().count() <= MAX_INFLECTION_LEN)
    })
}

/// Title the blocklist runs against: the display title, or the file name
/// from the URL when the service gave none.
fn effective_title(title: &str, url: &str) -> String {
    let trimmed = title.trim();
    let source = if trimmed.is_empty() {
        file_name_from_url(url).unwrap_or_default()
    } else {
        trimmed.to_string()
    };
    source.replace('_', " ").to_lowercase()
}

impl QualityFilter {
    pub fn from_config(config: &FilterConfig) -> Self {
        let (aspect_min, aspect_max) = config.aspect_band();
        Self {
            min_width: config.min_width,
            min_height: config.min_height,
            aspect_min,
            aspect_max,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|value| normalize_extension(value))
                .collect(),
            url_blocklist: lowered_terms(&config.url_blocklist),
            title_blocklist: lowered_terms(&config.title_blocklist),
        }
    }

    fn reject(rule: FilterRule, reason: String) -> FilterDecision {
        FilterDecision::Rejected { rule, reason }
    }

    fn check_file_type(&self, url: &str) -> Option<FilterDecision> {
        let path = path_without_query(url).to_lowercase();
        if self
            .allowed_extensions
            .iter()
            .any(|extension| path.ends_with(extension.as_str()))
        {
            return None;
        }
        Some(Self::reject(
            FilterRule::FileType,
            format!(
                "file type not allowed (expected one of {})",
                self.allowed_extensions.join(", ")
            ),
        ))
    }

    fn check_minimum_size(&self, width: u32, height: u32) -> Option<FilterDecision> {
        if width >= self.min_width && height >= self.min_height {
            return None;
        }
        Some(Self::reject(
            FilterRule::MinimumSize,
            format!(
                "too small: {width}x{height} (minimum {}x{})",
                self.min_width, self.min_height
            ),
        ))
    }

    fn check_url_blocklist(&self, url: &str) -> Option<FilterDecision> {
        let lowered = url.to_lowercase();
        let term = self
            .url_blocklist
            .iter()
            .find(|term| lowered.contains(term.as_str()))?;
        Some(Self::reject(
            FilterRule::UrlBlocklist,
            format!("url contains blocked term '{term}'"),
        ))
    }

    fn check_title_blocklist(&self, title: &str, url: &str) -> Option<FilterDecision> {
        let lowered = effective_title(title, url);
        let term = self
            .title_blocklist
            .iter()
            .find(|term| title_contains_term(&lowered, term))?;
        Some(Self::reject(
            FilterRule::TitleBlocklist,
            format!("title contains blocked term '{term}'"),
        ))
    }

    fn check_aspect_ratio(&self, width: u32, height: u32) -> Option<FilterDecision> {
        if height == 0 {
            return Some(Self::reject(
                FilterRule::AspectRatio,
                "aspect ratio undefined for zero height".to_string(),
            ));
        }
        let ratio = f64::from(width) / f64::from(height);
        if ratio >= self.aspect_min && ratio <= self.aspect_max {
            return None;
        }
        Some(Self::reject(
            FilterRule::AspectRatio,
            format!(
                "aspect ratio {ratio:.2} outside {:.2}..{:.2}",
                self.aspect_min, self.aspect_max
            ),
        ))
    }

    /// Evaluates every rule in order and returns the first failure, if any.
    pub fn evaluate(&self, url: &str, title: &str, width: u32, height: u32) -> FilterDecision {
        self.check_file_type(url)
            .or_else(|| self.check_minimum_size(width, height))
            .or_else(|| self.check_url_blocklist(url))
            .or_else(|| self.check_title_blocklist(title, url))
            .or_else(|| self.check_aspect_ratio(width, height))
            .unwrap_or(FilterDecision::Accepted)
    }
}
