//! Sequential batch over stored places with a per-run report.

use std::time::Duration;

use log::{debug, info, warn};

use crate::config::PacingConfig;
use crate::db_manager::{PlaceStore, StoreError};
use crate::dimension_resolver::DimensionCache;
use crate::place_image_updater::PlaceImageUpdater;
use crate::protocol::{BatchReport, Place, PlaceId};

/// Which places a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchScope {
    /// Every country, then every country's cities unless `countries_only`.
    AllPlaces { countries_only: bool },
    /// Cities of one country.
    CountryCities { country_code: String },
    /// Places looked up by name; `country` narrows the lookup to cities.
    Named {
        names: Vec<String>,
        country: Option<String>,
    },
}

pub struct BatchRunner<'a> {
    store: &'a dyn PlaceStore,
    updater: PlaceImageUpdater<'a>,
    cache: DimensionCache,
    inter_place_delay: Duration,
    previous_touched_network: bool,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        store: &'a dyn PlaceStore,
        updater: PlaceImageUpdater<'a>,
        pacing: &PacingConfig,
    ) -> Self {
        Self {
            store,
            updater,
            cache: DimensionCache::new(Duration::from_secs(pacing.dimension_cache_ttl_secs)),
            inter_place_delay: Duration::from_millis(pacing.inter_place_delay_ms),
            previous_touched_network: false,
        }
    }

    /// Processes every place in `scope`. Only a failure to list the top-level
    /// places is returned as an error; per-place problems land in the report.
    pub fn run(&mut self, scope: &BatchScope) -> Result<BatchReport, StoreError> {
        let mut report = BatchReport::default();
        self.previous_touched_network = false;
        let options = self.updater.options();
        info!(
            "Batch: starting {:?} (force={}, dry_run={})",
            scope, options.force, options.dry_run
        );

        match scope {
            BatchScope::AllPlaces { countries_only } => {
                let countries = self.store.list_countries()?;
                info!("Batch: {} country(ies) to process", countries.len());
                for country in &countries {
                    self.process_place(country, &mut report);
                }
                if !countries_only {
                    for country in &countries {
                        if let PlaceId::Country(code) = &country.id {
                            self.process_country_cities(code, &country.label(), &mut report);
                        }
                    }
                }
            }
            BatchScope::CountryCities { country_code } => {
                let cities = self.store.list_cities(country_code)?;
                if cities.is_empty() {
                    warn!("Batch: no cities stored for country {}", country_code);
                }
                for city in &cities {
                    self.process_place(city, &mut report);
                }
            }
            BatchScope::Named { names, country } => {
                for name in names {
                    self.process_named(name, country.as_deref(), &mut report);
                }
            }
        }

        let purged = self.cache.purge_expired();
        if !self.cache.is_empty() || purged > 0 {
            debug!(
                "Batch: dimension cache holds {} entry(ies), {} expired (ttl {:?})",
                self.cache.len(),
                purged,
                self.cache.ttl()
            );
        }
        info!(
            "Batch: processed {} place(s): {} updated, {} skipped, {} failed",
            report.total(),
            report.updated,
            report.skipped,
            report.failed
        );
        for failure in &report.failures {
            warn!("Batch: failed {}: {}", failure.place, failure.reason);
        }
        Ok(report)
    }

    fn process_country_cities(&mut self, code: &str, label: &str, report: &mut BatchReport) {
        match self.store.list_cities(code) {
            Ok(cities) => {
                debug!("Batch: {} city(ies) in {}", cities.len(), label);
                for city in &cities {
                    self.process_place(city, report);
                }
            }
            Err(error) => {
                warn!("Batch: failed to list cities of {}: {}", label, error);
                report.record_failure(label.to_string(), format!("failed to list cities: {error}"));
            }
        }
    }

    fn process_named(&mut self, name: &str, country: Option<&str>, report: &mut BatchReport) {
        let label = match country {
            Some(country) => format!("{name}, {country}"),
            None => name.to_string(),
        };
        match self.store.find_places_by_name(name, country) {
            Ok(places) if places.is_empty() => {
                warn!("Batch: no stored place named {}", label);
                report.record_failure(label, "place not found".to_string());
            }
            Ok(places) => {
                for place in &places {
                    self.process_place(place, report);
                }
            }
            Err(error) => {
                warn!("Batch: failed to look up {}: {}", label, error);
                report.record_failure(label, format!("failed to look up place: {error}"));
            }
        }
    }

    fn process_place(&mut self, place: &Place, report: &mut BatchReport) {
        if self.previous_touched_network && !self.inter_place_delay.is_zero() {
            std::thread::sleep(self.inter_place_delay);
        }
        let update = self.updater.update_place(place, &mut self.cache);
        debug!("Batch: {} -> {:?}", place.label(), update.outcome);
        self.previous_touched_network = update.touched_network;
        report.record(place, &update.outcome);
    }
}
