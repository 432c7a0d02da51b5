//! Freshness policy and persistence for one place.

use log::{debug, info, warn};

use crate::config::{FreshnessConfig, VariantsConfig};
use crate::db_manager::PlaceStore;
use crate::dimension_resolver::DimensionCache;
use crate::image_selector::ImageSelector;
use crate::image_url::{host_of, normalize_image_url};
use crate::protocol::{ImageSourceKind, PipelineResult, Place, PlaceOutcome, PlaceUpdate};
use crate::title_variants::variants_for_place;

pub const NO_SUITABLE_IMAGE: &str = "no suitable image found";

fn host_matches(host: &str, marker: &str) -> bool {
    let marker = marker.trim().trim_start_matches('.').to_ascii_lowercase();
    !marker.is_empty() && (host == marker || host.ends_with(&format!(".{marker}")))
}

/// Classifies a stored image reference by host. URLs without a host are `Other`.
pub fn classify_image_source(url: Option<&str>, freshness: &FreshnessConfig) -> ImageSourceKind {
    let Some(url) = url.map(str::trim).filter(|value| !value.is_empty()) else {
        return ImageSourceKind::Missing;
    };
    let Some(host) = host_of(url) else {
        return ImageSourceKind::Other;
    };
    if freshness
        .encyclopedia_markers
        .iter()
        .any(|marker| host_matches(&host, marker))
    {
        ImageSourceKind::Encyclopedia
    } else if freshness
        .stock_markers
        .iter()
        .any(|marker| host_matches(&host, marker))
    {
        ImageSourceKind::Stock
    } else {
        ImageSourceKind::Other
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Re-source even when the current image is already from the encyclopedia.
    pub force: bool,
    /// Run the pipeline but never write.
    pub dry_run: bool,
}

pub struct PlaceImageUpdater<'a> {
    store: &'a dyn PlaceStore,
    selector: ImageSelector<'a>,
    variants: &'a VariantsConfig,
    freshness: &'a FreshnessConfig,
    options: UpdateOptions,
}

impl<'a> PlaceImageUpdater<'a> {
    pub fn new(
        store: &'a dyn PlaceStore,
        selector: ImageSelector<'a>,
        variants: &'a VariantsConfig,
        freshness: &'a FreshnessConfig,
        options: UpdateOptions,
    ) -> Self {
        Self {
            store,
            selector,
            variants,
            freshness,
            options,
        }
    }

    pub fn options(&self) -> UpdateOptions {
        self.options
    }

    /// Applies the freshness policy and, when needed, the selector to one
    /// place. An image this updater wrote on an earlier run counts as already
    /// sourced whatever its host.
    pub fn update_place(&self, place: &Place, cache: &mut DimensionCache) -> PlaceUpdate {
        let label = place.label();
        let stored = match self.store.stored_image(&place.id) {
            Ok(stored) => stored,
            Err(error) => {
                warn!("Update[{}]: failed to read current image: {}", label, error);
                return PlaceUpdate::offline(PlaceOutcome::Failed {
                    reason: format!("failed to read current image: {error}"),
                });
            }
        };
        if stored.url != place.current_image {
            debug!("Update[{}]: stored image changed since listing", label);
        }

        let source = if stored.sourced && stored.url.is_some() {
            ImageSourceKind::Encyclopedia
        } else {
            classify_image_source(stored.url.as_deref(), self.freshness)
        };
        if source == ImageSourceKind::Encyclopedia && !self.options.force {
            info!(
                "Update[{}]: skipped, current image already from encyclopedia",
                label
            );
            return PlaceUpdate::offline(PlaceOutcome::Skipped { source });
        }

        let variants = variants_for_place(place, self.variants);
        let candidate = match self.selector.select(&label, &variants, cache) {
            PipelineResult::Found(candidate) => candidate,
            PipelineResult::NotFound => {
                info!("Update[{}]: {}", label, NO_SUITABLE_IMAGE);
                return PlaceUpdate::queried(PlaceOutcome::Failed {
                    reason: NO_SUITABLE_IMAGE.to_string(),
                });
            }
        };
        let Some(url) = normalize_image_url(&candidate.url) else {
            warn!("Update[{}]: selected url is malformed: {}", label, candidate.url);
            return PlaceUpdate::queried(PlaceOutcome::Failed {
                reason: format!("selected url is malformed: {}", candidate.url),
            });
        };

        if self.options.dry_run {
            info!("Update[{}]: would set image to {} (dry run)", label, url);
            return PlaceUpdate::queried(PlaceOutcome::Updated { url, dry_run: true });
        }
        let outcome = match self.store.update_place_image(&place.id, &url) {
            Ok(()) => {
                info!("Update[{}]: image set to {}", label, url);
                PlaceOutcome::Updated {
                    url,
                    dry_run: false,
                }
            }
            Err(error) => {
                warn!("Update[{}]: failed to save image: {}", label, error);
                PlaceOutcome::Failed {
                    reason: format!("failed to save image: {error}"),
                }
            }
        };
        PlaceUpdate::queried(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{classify_image_source, PlaceImageUpdater, UpdateOptions, NO_SUITABLE_IMAGE};
    use crate::config::{FilterConfig, FreshnessConfig, VariantsConfig};
    use crate::dimension_resolver::DimensionCache;
    use crate::fake_store::MemoryStore;
    use crate::image_selector::ImageSelector;
    use crate::protocol::{ImageSourceKind, Place, PlaceId, PlaceOutcome, PlaceUpdate};
    use crate::quality_filter::QualityFilter;
    use crate::sources::fake::{FakeLookup, FakeSource};
    use crate::sources::RawCandidate;

    const COMMONS_PHOTO: &str = "//upload.wikimedia.org/wikipedia/commons/a/ab/Paris_rooftops.jpg";

    fn cache() -> DimensionCache {
        DimensionCache::new(Duration::from_secs(60))
    }

    fn france_source(url: &str) -> FakeSource {
        FakeSource::new().with_media_list(
            "Tourism in France",
            vec![RawCandidate::new(url, "", Some((1600, 900)))],
        )
    }

    fn run_update(
        store: &MemoryStore,
        source: &FakeSource,
        place: &Place,
        options: UpdateOptions,
    ) -> PlaceOutcome {
        run_update_flagged(store, source, place, options).outcome
    }

    fn run_update_flagged(
        store: &MemoryStore,
        source: &FakeSource,
        place: &Place,
        options: UpdateOptions,
    ) -> PlaceUpdate {
        let lookup = FakeLookup::new();
        let filter = QualityFilter::from_config(&FilterConfig::default());
        let variants = VariantsConfig::default();
        let freshness = FreshnessConfig::default();
        let selector = ImageSelector::new(source, &lookup, &filter, Duration::ZERO);
        let updater = PlaceImageUpdater::new(store, selector, &variants, &freshness, options);
        updater.update_place(place, &mut cache())
    }

    #[test]
    fn test_classify_image_source_by_host() {
        let freshness = FreshnessConfig::default();
        assert_eq!(classify_image_source(None, &freshness), ImageSourceKind::Missing);
        assert_eq!(
            classify_image_source(Some("  "), &freshness),
            ImageSourceKind::Missing
        );
        assert_eq!(
            classify_image_source(
                Some("https://upload.wikimedia.org/wikipedia/commons/a/ab/X.jpg"),
                &freshness
            ),
            ImageSourceKind::Encyclopedia
        );
        assert_eq!(
            classify_image_source(Some("//en.wikipedia.org/wiki/File:X.jpg"), &freshness),
            ImageSourceKind::Encyclopedia
        );
        assert_eq!(
            classify_image_source(Some("https://images.unsplash.com/photo-1"), &freshness),
            ImageSourceKind::Stock
        );
        assert_eq!(
            classify_image_source(Some("https://cdn.example.com/x.jpg"), &freshness),
            ImageSourceKind::Other
        );
        assert_eq!(
            classify_image_source(Some("https://notwikipedia.org/x.jpg"), &freshness),
            ImageSourceKind::Other
        );
        assert_eq!(
            classify_image_source(Some("/static/x.jpg"), &freshness),
            ImageSourceKind::Other
        );
    }

    #[test]
    fn test_stock_image_is_replaced_and_second_run_is_skipped() {
        let store = MemoryStore::new().with_country(
            "FR",
            "France",
            Some("https://images.unsplash.com/photo-1"),
        );
        let source = france_source(COMMONS_PHOTO);
        let france = Place::country("FR", "France", None);

        let first = run_update(&store, &source, &france, UpdateOptions::default());
        let expected_url =
            "https://upload.wikimedia.org/wikipedia/commons/a/ab/Paris_rooftops.jpg".to_string();
        assert_eq!(
            first,
            PlaceOutcome::Updated {
                url: expected_url.clone(),
                dry_run: false
            }
        );
        assert_eq!(store.image(&france.id), Some(expected_url));

        let calls_after_first = source.total_calls();
        let second = run_update(&store, &source, &france, UpdateOptions::default());
        assert_eq!(
            second,
            PlaceOutcome::Skipped {
                source: ImageSourceKind::Encyclopedia
            }
        );
        assert_eq!(source.total_calls(), calls_after_first);
        assert_eq!(store.writes().len(), 1);
    }

    #[test]
    fn test_scheme_relative_url_is_persisted_as_https() {
        let store = MemoryStore::new().with_country("FR", "France", None);
        let source = france_source("//upload.example.org/photo.jpg");
        let france = Place::country("FR", "France", None);

        let outcome = run_update(&store, &source, &france, UpdateOptions::default());
        assert_eq!(
            outcome,
            PlaceOutcome::Updated {
                url: "https://upload.example.org/photo.jpg".to_string(),
                dry_run: false
            }
        );
        assert_eq!(
            store.writes(),
            vec![(
                PlaceId::Country("FR".to_string()),
                "https://upload.example.org/photo.jpg".to_string()
            )]
        );
    }

    #[test]
    fn test_not_found_leaves_current_image_unchanged() {
        let stock = "https://images.pexels.com/photos/1/atlantis.jpeg";
        let store = MemoryStore::new().with_country("XX", "Atlantis", Some(stock));
        let source = FakeSource::new();
        let atlantis = Place::country("XX", "Atlantis", Some(stock));

        let outcome = run_update(&store, &source, &atlantis, UpdateOptions::default());
        assert_eq!(
            outcome,
            PlaceOutcome::Failed {
                reason: NO_SUITABLE_IMAGE.to_string()
            }
        );
        assert_eq!(store.image(&atlantis.id).as_deref(), Some(stock));
        assert!(store.writes().is_empty());
        assert_eq!(source.media_list_calls().len(), 5);
    }

    #[test]
    fn test_persistence_error_is_reported_as_failure() {
        let store = MemoryStore::new()
            .with_country("FR", "France", None)
            .failing_writes();
        let source = france_source(COMMONS_PHOTO);
        let france = Place::country("FR", "France", None);

        let outcome = run_update(&store, &source, &france, UpdateOptions::default());
        let PlaceOutcome::Failed { reason } = outcome else {
            panic!("write failure should be reported as failed");
        };
        assert!(reason.starts_with("failed to save image"));
        assert_eq!(store.image(&france.id), None);
    }

    #[test]
    fn test_dry_run_reports_without_writing() {
        let store = MemoryStore::new().with_country("FR", "France", None);
        let source = france_source(COMMONS_PHOTO);
        let france = Place::country("FR", "France", None);
        let options = UpdateOptions {
            force: false,
            dry_run: true,
        };

        let outcome = run_update(&store, &source, &france, options);
        assert!(matches!(outcome, PlaceOutcome::Updated { dry_run: true, .. }));
        assert!(store.writes().is_empty());
    }

    #[test]
    fn test_force_bypasses_freshness_policy() {
        let current = "https://upload.wikimedia.org/wikipedia/commons/f/ff/Old_flag.jpg";
        let store = MemoryStore::new().with_country("FR", "France", Some(current));
        let source = france_source(COMMONS_PHOTO);
        let france = Place::country("FR", "France", Some(current));

        let skipped = run_update(&store, &source, &france, UpdateOptions::default());
        assert!(matches!(skipped, PlaceOutcome::Skipped { .. }));
        assert_eq!(source.total_calls(), 0);

        let forced = run_update(
            &store,
            &source,
            &france,
            UpdateOptions {
                force: true,
                dry_run: false,
            },
        );
        assert!(matches!(forced, PlaceOutcome::Updated { dry_run: false, .. }));
        assert_ne!(store.image(&france.id).as_deref(), Some(current));
    }

    #[test]
    fn test_unknown_place_fails_without_fetching() {
        let store = MemoryStore::new();
        let source = france_source(COMMONS_PHOTO);
        let ghost = Place::city(42, "Ghost Town", Some("France"), None);

        let outcome = run_update(&store, &source, &ghost, UpdateOptions::default());
        assert!(matches!(outcome, PlaceOutcome::Failed { .. }));
        assert_eq!(source.total_calls(), 0);
    }

    #[test]
    fn test_image_from_unlisted_host_is_skipped_on_second_run() {
        let store = MemoryStore::new().with_country("FR", "France", None);
        let source = france_source("//upload.example.org/photo.jpg");
        let france = Place::country("FR", "France", None);

        let first = run_update(&store, &source, &france, UpdateOptions::default());
        assert!(matches!(first, PlaceOutcome::Updated { dry_run: false, .. }));

        let calls_after_first = source.total_calls();
        let second = run_update(&store, &source, &france, UpdateOptions::default());
        assert_eq!(
            second,
            PlaceOutcome::Skipped {
                source: ImageSourceKind::Encyclopedia
            }
        );
        assert_eq!(source.total_calls(), calls_after_first);
        assert_eq!(store.writes().len(), 1);
    }

    #[test]
    fn test_dry_run_does_not_mark_image_as_sourced() {
        let store = MemoryStore::new().with_country("FR", "France", None);
        let source = france_source("//upload.example.org/photo.jpg");
        let france = Place::country("FR", "France", None);
        let dry_run = UpdateOptions {
            force: false,
            dry_run: true,
        };

        run_update(&store, &source, &france, dry_run);
        let second = run_update(&store, &source, &france, dry_run);
        assert!(matches!(second, PlaceOutcome::Updated { dry_run: true, .. }));
    }

    #[test]
    fn test_network_flag_follows_the_selector() {
        let current = "https://upload.wikimedia.org/wikipedia/commons/f/ff/Old_flag.jpg";
        let store = MemoryStore::new()
            .with_country("FR", "France", Some(current))
            .with_country("XX", "Atlantis", None);
        let source = france_source(COMMONS_PHOTO);

        let ghost = Place::city(42, "Ghost Town", Some("France"), None);
        let unknown = run_update_flagged(&store, &source, &ghost, UpdateOptions::default());
        assert!(matches!(unknown.outcome, PlaceOutcome::Failed { .. }));
        assert!(!unknown.touched_network);

        let france = Place::country("FR", "France", Some(current));
        let skipped = run_update_flagged(&store, &source, &france, UpdateOptions::default());
        assert!(matches!(skipped.outcome, PlaceOutcome::Skipped { .. }));
        assert!(!skipped.touched_network);

        let atlantis = Place::country("XX", "Atlantis", None);
        let not_found = run_update_flagged(&store, &source, &atlantis, UpdateOptions::default());
        assert!(matches!(not_found.outcome, PlaceOutcome::Failed { .. }));
        assert!(not_found.touched_network);
    }
}
