//! In-memory place store used by updater and batch tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::db_manager::{PlaceStore, StoreError};
use crate::protocol::{Place, PlaceId, StoredImage};

#[derive(Default)]
pub struct MemoryStore {
    countries: Vec<Place>,
    cities: Vec<(String, Place)>,
    images: RefCell<HashMap<PlaceId, StoredImage>>,
    writes: RefCell<Vec<(PlaceId, String)>>,
    fail_writes: bool,
    failing_city_listings: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_country(mut self, code: &str, name: &str, image: Option<&str>) -> Self {
        let place = Place::country(code, name, image);
        self.images.get_mut().insert(
            place.id.clone(),
            StoredImage {
                url: image.map(str::to_string),
                sourced: false,
            },
        );
        self.countries.push(place);
        self
    }

    pub fn with_city(mut self, id: i64, country_code: &str, name: &str, image: Option<&str>) -> Self {
        let country = self
            .countries
            .iter()
            .find(|place| place.id == PlaceId::Country(country_code.to_string()))
            .map(|place| place.name.clone());
        let place = Place::city(id, name, country.as_deref(), image);
        self.images.get_mut().insert(
            place.id.clone(),
            StoredImage {
                url: image.map(str::to_string),
                sourced: false,
            },
        );
        self.cities.push((country_code.to_string(), place));
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn failing_city_listing(mut self, country_code: &str) -> Self {
        self.failing_city_listings.insert(country_code.to_string());
        self
    }

    pub fn image(&self, id: &PlaceId) -> Option<String> {
        self.images
            .borrow()
            .get(id)
            .and_then(|stored| stored.url.clone())
    }

    pub fn writes(&self) -> Vec<(PlaceId, String)> {
        self.writes.borrow().clone()
    }
}

impl PlaceStore for MemoryStore {
    fn list_countries(&self) -> Result<Vec<Place>, StoreError> {
        Ok(self.countries.clone())
    }

    fn list_cities(&self, country_code: &str) -> Result<Vec<Place>, StoreError> {
        if self.failing_city_listings.contains(country_code) {
            return Err(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows));
        }
        Ok(self
            .cities
            .iter()
            .filter(|(code, _)| code == country_code)
            .map(|(_, place)| place.clone())
            .collect())
    }

    fn find_places_by_name(
        &self,
        name: &str,
        country: Option<&str>,
    ) -> Result<Vec<Place>, StoreError> {
        let matches_name = |place: &Place| place.name.eq_ignore_ascii_case(name);
        let mut places = Vec::new();
        if country.is_none() {
            places.extend(self.countries.iter().filter(|place| matches_name(*place)).cloned());
        }
        places.extend(
            self.cities
                .iter()
                .filter(|(code, place)| {
                    matches_name(place)
                        && country.map_or(true, |wanted| {
                            code.eq_ignore_ascii_case(wanted)
                                || place
                                    .country_context
                                    .as_deref()
                                    .is_some_and(|name| name.eq_ignore_ascii_case(wanted))
                        })
                })
                .map(|(_, place)| place.clone()),
        );
        Ok(places)
    }

    fn stored_image(&self, id: &PlaceId) -> Result<StoredImage, StoreError> {
        self.images
            .borrow()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn update_place_image(&self, id: &PlaceId, url: &str) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
        }
        let mut images = self.images.borrow_mut();
        let slot = images
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        *slot = StoredImage {
            url: Some(url.to_string()),
            sourced: true,
        };
        self.writes.borrow_mut().push((id.clone(), url.to_string()));
        Ok(())
    }
}
