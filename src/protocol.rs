//! Shared data model for the image sourcing pipeline.
//!
//! Places are read from and written back to the place store; candidates and
//! filter decisions are ephemeral and live for one pipeline run only.

use std::fmt;

/// Kind of place an image is sourced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaceKind {
    Country,
    City,
}

/// Store key of a place: ISO code for countries, row id for cities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlaceId {
    Country(String),
    City(i64),
}

impl PlaceId {
    pub fn kind(&self) -> PlaceKind {
        match self {
            Self::Country(_) => PlaceKind::Country,
            Self::City(_) => PlaceKind::City,
        }
    }
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Country(code) => write!(f, "country:{code}"),
            Self::City(id) => write!(f, "city:{id}"),
        }
    }
}

/// A country or city that owns an image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Place {
    pub id: PlaceId,
    /// Display name, also used to build query titles.
    pub name: String,
    /// URL currently stored for this place.
    pub current_image: Option<String>,
    /// Parent country name for cities.
    pub country_context: Option<String>,
}

impl Place {
    pub fn country(code: &str, name: &str, current_image: Option<&str>) -> Self {
        Self {
            id: PlaceId::Country(code.to_string()),
            name: name.to_string(),
            current_image: current_image.map(str::to_string),
            country_context: None,
        }
    }

    pub fn city(id: i64, name: &str, country: Option<&str>, current_image: Option<&str>) -> Self {
        Self {
            id: PlaceId::City(id),
            name: name.to_string(),
            current_image: current_image.map(str::to_string),
            country_context: country.map(str::to_string),
        }
    }

    pub fn kind(&self) -> PlaceKind {
        self.id.kind()
    }

    /// Human-readable label used in logs and failure reports.
    pub fn label(&self) -> String {
        match self.country_context.as_deref() {
            Some(country) if !country.trim().is_empty() => format!("{}, {}", self.name, country),
            _ => self.name.clone(),
        }
    }
}

/// Image reference as persisted, with its provenance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredImage {
    pub url: Option<String>,
    /// True when the URL was written by the image updater rather than seeded.
    pub sourced: bool,
}

/// One photograph offered by the media service, with resolved dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub url: String,
    pub title: String,
    pub width: u32,
    pub height: u32,
}

/// Quality rules in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterRule {
    FileType,
    MinimumSize,
    UrlBlocklist,
    TitleBlocklist,
    AspectRatio,
}

impl FilterRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileType => "file_type",
            Self::MinimumSize => "minimum_size",
            Self::UrlBlocklist => "url_blocklist",
            Self::TitleBlocklist => "title_blocklist",
            Self::AspectRatio => "aspect_ratio",
        }
    }
}

/// Result of evaluating one candidate against the quality rules.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterDecision {
    Accepted,
    Rejected { rule: FilterRule, reason: String },
}

impl FilterDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Accepted => None,
            Self::Rejected { reason, .. } => Some(reason.as_str()),
        }
    }

    pub fn rule(&self) -> Option<FilterRule> {
        match self {
            Self::Accepted => None,
            Self::Rejected { rule, .. } => Some(*rule),
        }
    }
}

/// Outcome of the full pipeline for one place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineResult {
    Found(ImageCandidate),
    NotFound,
}

/// Where a stored image URL comes from, judged by its URL alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSourceKind {
    Missing,
    Encyclopedia,
    Stock,
    Other,
}

/// Per-place result reported to the batch runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceOutcome {
    Updated { url: String, dry_run: bool },
    Skipped { source: ImageSourceKind },
    Failed { reason: String },
}

/// Outcome of one place plus whether the media service was queried for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceUpdate {
    pub outcome: PlaceOutcome,
    pub touched_network: bool,
}

impl PlaceUpdate {
    pub fn offline(outcome: PlaceOutcome) -> Self {
        Self {
            outcome,
            touched_network: false,
        }
    }

    pub fn queried(outcome: PlaceOutcome) -> Self {
        Self {
            outcome,
            touched_network: true,
        }
    }
}

/// A failed place and why, kept for the final report.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PlaceFailure {
    pub place: String,
    pub reason: String,
}

/// Aggregate statistics of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BatchReport {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub updated_places: Vec<String>,
    pub failures: Vec<PlaceFailure>,
}

impl BatchReport {
    pub fn record(&mut self, place: &Place, outcome: &PlaceOutcome) {
        match outcome {
            PlaceOutcome::Updated { .. } => {
                self.updated += 1;
                self.updated_places.push(place.label());
            }
            PlaceOutcome::Skipped { .. } => self.skipped += 1,
            PlaceOutcome::Failed { reason } => self.record_failure(place.label(), reason.clone()),
        }
    }

    pub fn record_failure(&mut self, place: String, reason: String) {
        self.failed += 1;
        self.failures.push(PlaceFailure { place, reason });
    }

    pub fn total(&self) -> usize {
        self.updated + self.skipped + self.failed
    }

    /// Plain-text summary for operators.
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "processed {} place(s): {} updated, {} skipped, {} failed\n",
            self.total(),
            self.updated,
            self.skipped,
            self.failed
        );
        for failure in &self.failures {
            out.push_str(&format!("  FAILED {}: {}\n", failure.place, failure.reason));
        }
        out
    }
}
