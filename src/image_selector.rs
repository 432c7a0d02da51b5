//! First-good-image-wins selection across query variants.

use std::time::Duration;

use log::{debug, info};

use crate::dimension_resolver::{resolve_dimensions, DimensionCache};
use crate::image_url::normalize_image_url;
use crate::protocol::{FilterRule, ImageCandidate, PipelineResult};
use crate::quality_filter::QualityFilter;
use crate::sources::{collect_candidates, CandidateSource, DimensionLookup};

/// Walks variants in order and their candidates in source order, returning the
/// first candidate the quality filter accepts.
pub struct ImageSelector<'a> {
    source: &'a dyn CandidateSource,
    lookup: &'a dyn DimensionLookup,
    filter: &'a QualityFilter,
    inter_variant_delay: Duration,
}

impl<'a> ImageSelector<'a> {
    pub fn new(
        source: &'a dyn CandidateSource,
        lookup: &'a dyn DimensionLookup,
        filter: &'a QualityFilter,
        inter_variant_delay: Duration,
    ) -> Self {
        Self {
            source,
            lookup,
            filter,
            inter_variant_delay,
        }
    }

    /// Runs the pipeline for one place. `label` only tags log lines.
    pub fn select(
        &self,
        label: &str,
        variants: &[String],
        cache: &mut DimensionCache,
    ) -> PipelineResult {
        for (index, variant) in variants.iter().enumerate() {
            if index > 0 && !self.inter_variant_delay.is_zero() {
                std::thread::sleep(self.inter_variant_delay);
            }
            if let Some(candidate) = self.select_from_variant(label, variant, cache) {
                info!(
                    "ImageSearch[{}]: accepted '{}' ({}x{}) from variant '{}'",
                    label, candidate.url, candidate.width, candidate.height, variant
                );
                return PipelineResult::Found(candidate);
            }
        }
        info!(
            "ImageSearch[{}]: no suitable image after {} variant(s)",
            label,
            variants.len()
        );
        PipelineResult::NotFound
    }

    fn select_from_variant(
        &self,
        label: &str,
        variant: &str,
        cache: &mut DimensionCache,
    ) -> Option<ImageCandidate> {
        let raw_candidates = collect_candidates(self.source, variant);
        debug!(
            "ImageSearch[{}]: variant '{}' offered {} candidate(s)",
            label,
            variant,
            raw_candidates.len()
        );
        for raw in raw_candidates {
            let Some(url) = normalize_image_url(&raw.url) else {
                debug!(
                    "ImageSearch[{}]: skipping malformed url '{}'",
                    label, raw.url
                );
                continue;
            };
            let dimensions = resolve_dimensions(&url, raw.declared_size, self.lookup, cache);
            let decision =
                self.filter
                    .evaluate(&url, &raw.title, dimensions.width, dimensions.height);
            if decision.is_accepted() {
                return Some(ImageCandidate {
                    url,
                    title: raw.title,
                    width: dimensions.width,
                    height: dimensions.height,
                });
            }
            debug!(
                "ImageSearch[{}]: rejected '{}' ({}x{} via {:?}) [{}]: {}",
                label,
                url,
                dimensions.width,
                dimensions.height,
                dimensions.basis,
                decision.rule().map(FilterRule::as_str).unwrap_or_default(),
                decision.reason().unwrap_or_default()
            );
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::ImageSelector;
    use crate::config::{FilterConfig, VariantsConfig};
    use crate::dimension_resolver::DimensionCache;
    use crate::protocol::{ImageCandidate, PipelineResult, Place};
    use crate::quality_filter::QualityFilter;
    use crate::sources::fake::{FakeLookup, FakeSource};
    use crate::sources::RawCandidate;
    use crate::title_variants::variants_for_place;

    const FLAG_URL: &str =
        "//upload.wikimedia.org/wikipedia/commons/thumb/c/c3/Flag_of_France.svg/1280px-Flag_of_France.svg.png";
    const PARIS_URL: &str = "//upload.wikimedia.org/wikipedia/commons/a/ab/Paris_rooftops.jpg";

    fn cache() -> DimensionCache {
        DimensionCache::new(Duration::from_secs(60))
    }

    fn france_variants() -> Vec<String> {
        variants_for_place(&Place::country("FR", "France", None), &VariantsConfig::default())
    }

    #[test]
    fn test_first_accepted_candidate_short_circuits_everything_else() {
        let source = FakeSource::new()
            .with_media_list(
                "Tourism in France",
                vec![
                    RawCandidate::new(PARIS_URL, "File:Paris rooftops.jpg", Some((1600, 900))),
                    RawCandidate::new("//u/Second.jpg", "File:Second.jpg", Some((1600, 900))),
                ],
            )
            .with_media_list(
                "France",
                vec![RawCandidate::new("//u/Never.jpg", "", Some((1600, 900)))],
            );
        let lookup = FakeLookup::new();
        let filter = QualityFilter::from_config(&FilterConfig::default());
        let selector = ImageSelector::new(&source, &lookup, &filter, Duration::ZERO);

        let result = selector.select("France", &france_variants(), &mut cache());

        assert_eq!(
            result,
            PipelineResult::Found(ImageCandidate {
                url: "https://upload.wikimedia.org/wikipedia/commons/a/ab/Paris_rooftops.jpg"
                    .to_string(),
                title: "File:Paris rooftops.jpg".to_string(),
                width: 1600,
                height: 900,
            })
        );
        assert_eq!(source.total_calls(), 1);
        assert!(lookup.calls().is_empty());
    }

    #[test]
    fn test_rejected_flag_is_skipped_and_later_variant_wins() {
        let source = FakeSource::new()
            .with_media_list(
                "France",
                vec![RawCandidate::new(FLAG_URL, "File:Flag of France.svg", None)],
            )
            .with_media_list(
                "Geography of France",
                vec![RawCandidate::new(PARIS_URL, "", Some((1600, 900)))],
            );
        let lookup = FakeLookup::new();
        let filter = QualityFilter::from_config(&FilterConfig::default());
        let selector = ImageSelector::new(&source, &lookup, &filter, Duration::ZERO);

        let variants = france_variants();
        let result = selector.select("France", &variants, &mut cache());
        let PipelineResult::Found(candidate) = result else {
            panic!("a later variant should have produced an image");
        };
        assert!(candidate.url.ends_with("Paris_rooftops.jpg"));
        assert_eq!(
            source.media_list_calls(),
            vec![
                "Tourism in France",
                "Culture of France",
                "History of France",
                "Geography of France",
            ]
        );

        let flag_only = FakeSource::new().with_media_list(
            "France",
            vec![RawCandidate::new(FLAG_URL, "File:Flag of France.svg", None)],
        );
        let selector = ImageSelector::new(&flag_only, &lookup, &filter, Duration::ZERO);
        assert_eq!(
            selector.select("France", &["France".to_string()], &mut cache()),
            PipelineResult::NotFound
        );
    }

    #[test]
    fn test_ties_are_broken_by_source_order() {
        let source = FakeSource::new().with_media_list(
            "Lyon",
            vec![
                RawCandidate::new("//u/Small.jpg", "", Some((640, 427))),
                RawCandidate::new("//u/First_good.jpg", "", Some((1800, 1000))),
                RawCandidate::new("//u/Bigger_good.jpg", "", Some((4000, 2400))),
            ],
        );
        let lookup = FakeLookup::new();
        let filter = QualityFilter::from_config(&FilterConfig::default());
        let selector = ImageSelector::new(&source, &lookup, &filter, Duration::ZERO);
        let PipelineResult::Found(candidate) =
            selector.select("Lyon", &["Lyon".to_string()], &mut cache())
        else {
            panic!("expected an accepted candidate");
        };
        assert_eq!(candidate.url, "https://u/First_good.jpg");
    }

    #[test]
    fn test_malformed_urls_are_skipped() {
        let source = FakeSource::new().with_media_list(
            "Lyon",
            vec![
                RawCandidate::new("/wiki/File:Relative.jpg", "", Some((1800, 1000))),
                RawCandidate::new("https://u/Absolute.jpg", "", Some((1800, 1000))),
            ],
        );
        let lookup = FakeLookup::new();
        let filter = QualityFilter::from_config(&FilterConfig::default());
        let selector = ImageSelector::new(&source, &lookup, &filter, Duration::ZERO);
        let PipelineResult::Found(candidate) =
            selector.select("Lyon", &["Lyon".to_string()], &mut cache())
        else {
            panic!("expected the absolute url to be accepted");
        };
        assert_eq!(candidate.url, "https://u/Absolute.jpg");
    }

    #[test]
    fn test_all_variants_empty_is_not_found() {
        let source = FakeSource::new();
        let lookup = FakeLookup::new();
        let filter = QualityFilter::from_config(&FilterConfig::default());
        let selector = ImageSelector::new(&source, &lookup, &filter, Duration::ZERO);
        let variants = variants_for_place(
            &Place::country("XX", "Atlantis", None),
            &VariantsConfig::default(),
        );

        assert_eq!(
            selector.select("Atlantis", &variants, &mut cache()),
            PipelineResult::NotFound
        );
        assert_eq!(source.media_list_calls().len(), 5);
        assert_eq!(source.summary_calls().len(), 5);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let source = FakeSource::new().with_media_list(
            "Culture of France",
            vec![
                RawCandidate::new("//u/A.jpg", "", Some((1600, 900))),
                RawCandidate::new("//u/B.jpg", "", Some((1600, 900))),
            ],
        );
        let lookup = FakeLookup::new();
        let filter = QualityFilter::from_config(&FilterConfig::default());
        let selector = ImageSelector::new(&source, &lookup, &filter, Duration::ZERO);
        let variants = france_variants();
        let first = selector.select("France", &variants, &mut cache());
        let second = selector.select("France", &variants, &mut cache());
        assert_eq!(first, second);
    }

    #[test]
    fn test_delay_separates_consecutive_variants() {
        let source = FakeSource::new();
        let lookup = FakeLookup::new();
        let filter = QualityFilter::from_config(&FilterConfig::default());
        let selector = ImageSelector::new(&source, &lookup, &filter, Duration::from_millis(20));
        let variants = vec!["A".to_string(), "B".to_string(), "C".to_string()];

        let started = Instant::now();
        assert_eq!(
            selector.select("A", &variants, &mut cache()),
            PipelineResult::NotFound
        );
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_hit_on_first_variant_is_not_delayed() {
        let source = FakeSource::new()
            .with_media_list("Lyon", vec![RawCandidate::new("//u/View.jpg", "", Some((1600, 900)))]);
        let lookup = FakeLookup::new();
        let filter = QualityFilter::from_config(&FilterConfig::default());
        let selector = ImageSelector::new(&source, &lookup, &filter, Duration::from_millis(500));
        let variants = vec!["Lyon".to_string(), "Tourism in Lyon".to_string()];

        let started = Instant::now();
        let result = selector.select("Lyon", &variants, &mut cache());
        assert!(matches!(result, PipelineResult::Found(_)));
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
