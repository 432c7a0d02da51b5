mod batch_runner;
mod config;
mod config_persistence;
mod db_manager;
mod dimension_resolver;
#[cfg(test)]
mod fake_store;
mod image_selector;
mod image_url;
mod place_image_updater;
mod protocol;
mod quality_filter;
mod sources;
mod title_variants;
mod ttl_cache;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use log::{error, info};

use crate::batch_runner::{BatchRunner, BatchScope};
use crate::config::{Config, FilterProfile};
use crate::config_persistence::{default_config_path, default_database_path, load_or_create_config};
use crate::db_manager::DbManager;
use crate::dimension_resolver::DimensionCache;
use crate::image_selector::ImageSelector;
use crate::place_image_updater::{PlaceImageUpdater, UpdateOptions, NO_SUITABLE_IMAGE};
use crate::protocol::{BatchReport, PipelineResult, Place};
use crate::quality_filter::QualityFilter;
use crate::sources::wikimedia::WikimediaClient;
use crate::title_variants::variants_for_place;

#[derive(Parser)]
#[command(name = "placeshot")]
#[command(about = "Finds and stores representative photographs for countries and cities")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// SQLite place database (overrides the config file)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    /// Aspect-ratio band: strict or permissive
    #[arg(long, global = true)]
    profile: Option<FilterProfile>,
    /// Delay between places in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    delay_ms: Option<u64>,
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy)]
struct UpdateFlags {
    /// Replace images even when they already come from the encyclopedia
    #[arg(long)]
    force: bool,
    /// Evaluate but never write
    #[arg(long)]
    dry_run: bool,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Process all countries, then their cities
    Run {
        /// Skip cities
        #[arg(long, conflicts_with = "country")]
        countries_only: bool,
        /// Only process the cities of this country code
        #[arg(long, value_name = "CODE")]
        country: Option<String>,
        #[command(flatten)]
        flags: UpdateFlags,
    },
    /// Process places by name
    Place {
        #[arg(required = true, value_name = "NAME")]
        names: Vec<String>,
        /// Restrict to cities of this country (name or code)
        #[arg(long, value_name = "NAME")]
        country: Option<String>,
        #[command(flatten)]
        flags: UpdateFlags,
    },
    /// Run image selection for a name and print the result without writing
    Probe {
        name: String,
        /// Treat the name as a city
        #[arg(long, requires = "country")]
        city: bool,
        /// Parent country of the city
        #[arg(long, value_name = "NAME")]
        country: Option<String>,
    },
    /// Import countries and cities from a JSON seed file
    Seed {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn log_level(cli: &Cli) -> log::LevelFilter {
    if cli.quiet {
        return log::LevelFilter::Warn;
    }
    match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let config_path = cli
        .config
        .clone()
        .or_else(default_config_path)
        .ok_or("could not determine config directory; pass --config")?;
    let mut config = load_or_create_config(&config_path)?;
    if let Some(profile) = cli.profile {
        config.filter.profile = profile;
        config.filter.aspect_ratio_min = None;
        config.filter.aspect_ratio_max = None;
    }
    if let Some(delay_ms) = cli.delay_ms {
        config.pacing.inter_place_delay_ms = delay_ms;
    }
    if let Some(db) = &cli.db {
        config.store.database_path = Some(db.clone());
    }
    config.validate()?;
    let (aspect_min, aspect_max) = config.filter.aspect_band();
    info!(
        "Config loaded. path={} profile={:?} aspect={:.2}..{:.2} min_size={}x{}",
        config_path.display(),
        config.filter.profile,
        aspect_min,
        aspect_max,
        config.filter.min_width,
        config.filter.min_height
    );
    Ok(config)
}

fn open_store(config: &Config) -> Result<DbManager, Box<dyn std::error::Error>> {
    let path = config
        .store
        .database_path
        .clone()
        .or_else(default_database_path)
        .ok_or("could not determine data directory; pass --db")?;
    info!("Opening place store. path={}", path.display());
    Ok(DbManager::open(&path)?)
}

fn print_report(report: &BatchReport, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

fn run_batch(
    config: &Config,
    scope: BatchScope,
    flags: UpdateFlags,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let client = WikimediaClient::new(&config.service, &config.pacing);
    let filter = QualityFilter::from_config(&config.filter);
    let selector = ImageSelector::new(
        &client,
        &client,
        &filter,
        Duration::from_millis(config.pacing.inter_variant_delay_ms),
    );
    let options = UpdateOptions {
        force: flags.force,
        dry_run: flags.dry_run,
    };
    let updater = PlaceImageUpdater::new(
        &store,
        selector,
        &config.variants,
        &config.freshness,
        options,
    );
    let mut runner = BatchRunner::new(&store, updater, &config.pacing);
    let report = runner.run(&scope)?;
    print_report(&report, flags.json)
}

fn probe(
    config: &Config,
    name: &str,
    city: bool,
    country: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = WikimediaClient::new(&config.service, &config.pacing);
    let filter = QualityFilter::from_config(&config.filter);
    let selector = ImageSelector::new(
        &client,
        &client,
        &filter,
        Duration::from_millis(config.pacing.inter_variant_delay_ms),
    );
    let place = if city {
        Place::city(0, name, country, None)
    } else {
        Place::country("", name, None)
    };
    let variants = variants_for_place(&place, &config.variants);
    let mut cache =
        DimensionCache::new(Duration::from_secs(config.pacing.dimension_cache_ttl_secs));
    match selector.select(&place.label(), &variants, &mut cache) {
        PipelineResult::Found(candidate) => println!(
            "{} ({}x{})",
            candidate.url, candidate.width, candidate.height
        ),
        PipelineResult::NotFound => println!("{NO_SUITABLE_IMAGE}"),
    }
    Ok(())
}

fn seed(config: &Config, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = open_store(config)?;
    let summary = store.import_seed_file(file)?;
    info!(
        "Seed imported. path={} countries={} cities={}",
        file.display(),
        summary.countries,
        summary.cities
    );
    println!(
        "imported {} country(ies) and {} city(ies)",
        summary.countries, summary.cities
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut clog = colog::default_builder();
    clog.filter(None, log_level(&cli));
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config = load_config(&cli).map_err(|err| {
        error!("Startup failed: {}", err);
        err
    })?;

    match cli.command {
        Commands::Run {
            countries_only,
            country,
            flags,
        } => {
            let scope = match country {
                Some(country_code) => BatchScope::CountryCities { country_code },
                None => BatchScope::AllPlaces { countries_only },
            };
            run_batch(&config, scope, flags)
        }
        Commands::Place {
            names,
            country,
            flags,
        } => run_batch(&config, BatchScope::Named { names, country }, flags),
        Commands::Probe {
            name,
            city,
            country,
        } => probe(&config, &name, city, country.as_deref()),
        Commands::Seed { file } => seed(&config, &file),
    }
}
