use crate::protocol::{Place, PlaceId, StoredImage};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("place {0} does not exist")]
    NotFound(PlaceId),
    #[error("failed to create data directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read seed file {path}: {source}")]
    SeedRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse seed file {path}: {source}")]
    SeedParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read/write access to stored places, the seam the updater and batch runner use.
pub trait PlaceStore {
    fn list_countries(&self) -> Result<Vec<Place>, StoreError>;
    fn list_cities(&self, country_code: &str) -> Result<Vec<Place>, StoreError>;
    /// Case-insensitive name match over countries and cities. `country`
    /// narrows cities to one parent country, by code or name.
    fn find_places_by_name(
        &self,
        name: &str,
        country: Option<&str>,
    ) -> Result<Vec<Place>, StoreError>;
    /// Current image of a place and whether this tool wrote it.
    fn stored_image(&self, id: &PlaceId) -> Result<StoredImage, StoreError>;
    /// Persists a sourced image and marks it as written by this tool.
    fn update_place_image(&self, id: &PlaceId, url: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedCountry {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub cities: Vec<SeedCity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedCity {
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub countries: usize,
    pub cities: usize,
}

pub struct DbManager {
    conn: Connection,
}

impl DbManager {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let conn = Connection::open(path)?;
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        db_manager.migrate()?;
        Ok(db_manager)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let db_manager = Self {
            conn: Connection::open_in_memory()?,
        };
        db_manager.initialize_schema()?;
        db_manager.migrate()?;
        Ok(db_manager)
    }

    fn initialize_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS countries (
                code TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                image_url TEXT,
                image_sourced INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS cities (
                id INTEGER PRIMARY KEY,
                country_code TEXT NOT NULL,
                name TEXT NOT NULL,
                image_url TEXT,
                image_sourced INTEGER NOT NULL DEFAULT 0,
                UNIQUE(country_code, name),
                FOREIGN KEY(country_code) REFERENCES countries(code)
            )",
            [],
        )?;
        Ok(())
    }

    fn has_column(&self, table: &str, column: &str) -> Result<bool, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let columns = stmt.query_map([], |row| row.get::<_, String>(1))?;
        for col in columns {
            if col? == column {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        // Databases created before provenance tracking lack image_sourced
        for table in ["countries", "cities"] {
            if !self.has_column(table, "image_sourced")? {
                self.conn.execute(
                    &format!(
                        "ALTER TABLE {table} ADD COLUMN image_sourced INTEGER NOT NULL DEFAULT 0"
                    ),
                    [],
                )?;
            }
        }
        Ok(())
    }

    /// Imports countries and their cities in one transaction. Existing image
    /// URLs are kept when the seed entry has none.
    pub fn import_seed(&mut self, countries: &[SeedCountry]) -> Result<SeedSummary, StoreError> {
        let tx = self.conn.transaction()?;
        let mut summary = SeedSummary::default();
        for country in countries {
            let code = country.code.trim().to_uppercase();
            upsert_country(
                &tx,
                &code,
                country.name.trim(),
                non_blank(country.image_url.as_deref()),
            )?;
            summary.countries += 1;
            for city in &country.cities {
                upsert_city(
                    &tx,
                    &code,
                    city.name.trim(),
                    non_blank(city.image_url.as_deref()),
                )?;
                summary.cities += 1;
            }
        }
        tx.commit()?;
        Ok(summary)
    }

    pub fn import_seed_file(&mut self, path: &Path) -> Result<SeedSummary, StoreError> {
        let text = std::fs::read_to_string(path).map_err(|source| StoreError::SeedRead {
            path: path.to_path_buf(),
            source,
        })?;
        let countries: Vec<SeedCountry> =
            serde_json::from_str(&text).map_err(|source| StoreError::SeedParse {
                path: path.to_path_buf(),
                source,
            })?;
        self.import_seed(&countries)
    }

    fn query_cities(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Place>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let city_iter = stmt.query_map(params, |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let country: Option<String> = row.get(2)?;
            let image_url: Option<String> = row.get(3)?;
            Ok(Place::city(
                id,
                &name,
                country.as_deref(),
                image_url.as_deref(),
            ))
        })?;

        let mut cities = Vec::new();
        for city in city_iter {
            cities.push(city?);
        }
        Ok(cities)
    }

    fn query_countries(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Place>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let country_iter = stmt.query_map(params, |row| {
            let code: String = row.get(0)?;
            let name: String = row.get(1)?;
            let image_url: Option<String> = row.get(2)?;
            Ok(Place::country(&code, &name, image_url.as_deref()))
        })?;

        let mut countries = Vec::new();
        for country in country_iter {
            countries.push(country?);
        }
        Ok(countries)
    }
}

/// A seeded image replaces the stored one and clears its provenance.
fn upsert_country(
    conn: &Connection,
    code: &str,
    name: &str,
    image_url: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO countries (code, name, image_url) VALUES (?1, ?2, ?3)
         ON CONFLICT(code) DO UPDATE SET
            name = excluded.name,
            image_sourced = CASE WHEN excluded.image_url IS NULL
                THEN countries.image_sourced ELSE 0 END,
            image_url = COALESCE(excluded.image_url, countries.image_url)",
        params![code, name, image_url],
    )?;
    Ok(())
}

fn upsert_city(
    conn: &Connection,
    country_code: &str,
    name: &str,
    image_url: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO cities (country_code, name, image_url) VALUES (?1, ?2, ?3)
         ON CONFLICT(country_code, name) DO UPDATE SET
            image_sourced = CASE WHEN excluded.image_url IS NULL
                THEN cities.image_sourced ELSE 0 END,
            image_url = COALESCE(excluded.image_url, cities.image_url)",
        params![country_code, name, image_url],
    )?;
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

const CITY_COLUMNS: &str = "SELECT cities.id, cities.name, countries.name, cities.image_url
     FROM cities LEFT JOIN countries ON countries.code = cities.country_code";

impl PlaceStore for DbManager {
    fn list_countries(&self) -> Result<Vec<Place>, StoreError> {
        self.query_countries(
            "SELECT code, name, image_url FROM countries ORDER BY name, code",
            [],
        )
    }

    fn list_cities(&self, country_code: &str) -> Result<Vec<Place>, StoreError> {
        self.query_cities(
            &format!("{CITY_COLUMNS} WHERE cities.country_code = ?1 ORDER BY cities.name, cities.id"),
            params![country_code.trim().to_uppercase()],
        )
    }

    fn find_places_by_name(
        &self,
        name: &str,
        country: Option<&str>,
    ) -> Result<Vec<Place>, StoreError> {
        let name = name.trim();
        let mut places = Vec::new();
        match country.map(str::trim).filter(|value| !value.is_empty()) {
            Some(country) => {
                places.extend(self.query_cities(
                    &format!(
                        "{CITY_COLUMNS} WHERE cities.name = ?1 COLLATE NOCASE
                         AND (cities.country_code = ?2 COLLATE NOCASE
                              OR countries.name = ?2 COLLATE NOCASE)
                         ORDER BY cities.id"
                    ),
                    params![name, country],
                )?);
            }
            None => {
                places.extend(self.query_countries(
                    "SELECT code, name, image_url FROM countries
                     WHERE name = ?1 COLLATE NOCASE OR code = ?1 COLLATE NOCASE
                     ORDER BY code",
                    params![name],
                )?);
                places.extend(self.query_cities(
                    &format!("{CITY_COLUMNS} WHERE cities.name = ?1 COLLATE NOCASE ORDER BY cities.id"),
                    params![name],
                )?);
            }
        }
        Ok(places)
    }

    fn stored_image(&self, id: &PlaceId) -> Result<StoredImage, StoreError> {
        let read_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<StoredImage> {
            Ok(StoredImage {
                url: row.get(0)?,
                sourced: row.get(1)?,
            })
        };
        let stored = match id {
            PlaceId::Country(code) => self
                .conn
                .query_row(
                    "SELECT image_url, image_sourced FROM countries WHERE code = ?1",
                    params![code],
                    read_row,
                )
                .optional()?,
            PlaceId::City(city_id) => self
                .conn
                .query_row(
                    "SELECT image_url, image_sourced FROM cities WHERE id = ?1",
                    params![city_id],
                    read_row,
                )
                .optional()?,
        };
        stored.ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn update_place_image(&self, id: &PlaceId, url: &str) -> Result<(), StoreError> {
        let changed = match id {
            PlaceId::Country(code) => self.conn.execute(
                "UPDATE countries SET image_url = ?1, image_sourced = 1 WHERE code = ?2",
                params![url, code],
            )?,
            PlaceId::City(city_id) => self.conn.execute(
                "UPDATE cities SET image_url = ?1, image_sourced = 1 WHERE id = ?2",
                params![url, city_id],
            )?,
        };
        if changed == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }
}
