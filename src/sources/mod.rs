//! Candidate image source abstractions and concrete implementations.

#[cfg(test)]
pub mod fake;
pub mod wikimedia;

use log::{debug, info};

/// Image offered by the media service before dimensions are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCandidate {
    /// Resource location as returned by the service; may be scheme-relative.
    pub url: String,
    /// Display title of the underlying media item; may be empty.
    pub title: String,
    /// Width and height when the service declared them.
    pub declared_size: Option<(u32, u32)>,
}

impl RawCandidate {
    pub fn new(url: &str, title: &str, declared_size: Option<(u32, u32)>) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            declared_size,
        }
    }
}

/// Interface implemented by media services that list images for an article title.
pub trait CandidateSource {
    /// Every image embedded in the article, largest rendition of each.
    fn fetch_media_list(&self, title: &str) -> Result<Vec<RawCandidate>, String>;
    /// The article's single lead image, if any.
    fn fetch_summary_image(&self, title: &str) -> Result<Option<RawCandidate>, String>;
}

/// Secondary metadata lookup for the true size of a media file.
pub trait DimensionLookup {
    fn lookup_dimensions(&self, file_name: &str) -> Result<(u32, u32), String>;
}

/// Runs the media-list strategy, then the summary strategy when the first one
/// produced nothing. Failures are logged and count as zero candidates.
pub fn collect_candidates(source: &dyn CandidateSource, title: &str) -> Vec<RawCandidate> {
    match source.fetch_media_list(title) {
        Ok(candidates) if !candidates.is_empty() => {
            debug!(
                "Candidates['{}']: media-list returned {} image(s)",
                title,
                candidates.len()
            );
            return candidates;
        }
        Ok(_) => debug!("Candidates['{}']: media-list returned no images", title),
        Err(error) => info!("Candidates['{}']: media-list failed: {}", title, error),
    }

    match source.fetch_summary_image(title) {
        Ok(Some(candidate)) => {
            debug!("Candidates['{}']: using summary lead image", title);
            vec![candidate]
        }
        Ok(None) => {
            debug!("Candidates['{}']: summary has no lead image", title);
            Vec::new()
        }
        Err(error) => {
            info!("Candidates['{}']: summary failed: {}", title, error);
            Vec::new()
        }
    }
}
