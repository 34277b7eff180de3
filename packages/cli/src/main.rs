#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for geofill.
//!
//! Connects to a TeslaMate database, finds every drive and charging session
//! whose address still points at the placeholder, and backfills them with
//! one reverse-geocoding call per grid cell.
//!
//! Uses `indicatif-log-bridge` (via [`geofill_cli_utils::init_logger`]) so
//! that log lines and the lookup progress bar never fight for the terminal.

use std::io::IsTerminal as _;
use std::time::Duration;

use clap::Parser;
use dialoguer::Confirm;
use geofill_database::PostgresStore;
use geofill_database::db::{self, ConnectionSettings};
use geofill_dedup::config::{DEFAULT_COMMIT_EVERY, DEFAULT_PLACEHOLDER_MARKER};
use geofill_dedup::grid::DEFAULT_GRID_SIZE;
use geofill_dedup::{DedupConfig, RunReport};
use geofill_geocoder::build_geocoder;
use geofill_geocoder::service_registry::{GeocodingService, enabled_services, find_service};

#[derive(Parser)]
#[command(
    name = "geofill",
    about = "Backfill pending TeslaMate addresses with grid-deduplicated reverse geocoding"
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Reverse-geocoding API key. Not needed with `--dry-run`.
    #[arg(long, env = "GOOGLE_MAPS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Full Postgres URL. Overrides the individual `--db-*` options.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Database host
    #[arg(long, env = "DATABASE_HOST", default_value = "127.0.0.1")]
    db_host: String,

    /// Database port
    #[arg(long, env = "DATABASE_PORT", default_value_t = 5432)]
    db_port: u16,

    /// Database user
    #[arg(long, env = "DATABASE_USER", default_value = "teslamate")]
    db_user: String,

    /// Database password (required unless `--database-url` is given)
    #[arg(long, env = "DATABASE_PASS", hide_env_values = true)]
    db_pass: Option<String>,

    /// Database name
    #[arg(long, env = "DATABASE_NAME", default_value = "teslamate")]
    db_name: String,

    /// Grid cell size in degrees (0.0005 is roughly 55m north-south).
    #[arg(long, default_value_t = DEFAULT_GRID_SIZE)]
    grid_size: f64,

    /// Pause between consecutive API calls, in milliseconds.
    #[arg(long, default_value_t = 100)]
    delay_ms: u64,

    /// Commit after this many successful lookups.
    #[arg(long, default_value_t = DEFAULT_COMMIT_EVERY)]
    commit_every: u64,

    /// Display-name fragment identifying the placeholder address.
    #[arg(long, default_value = DEFAULT_PLACEHOLDER_MARKER)]
    placeholder_marker: String,

    /// Reverse-geocoding provider id.
    #[arg(long, default_value = "google")]
    provider: String,

    /// Show what would be done without calling the API or writing anything.
    #[arg(long)]
    dry_run: bool,

    /// Skip the cost confirmation prompt.
    #[arg(long, short)]
    yes: bool,

    /// Print the run report as JSON instead of text.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn dedup_config(&self, service: &GeocodingService) -> DedupConfig {
        DedupConfig {
            grid_size: self.grid_size,
            delay: Duration::from_millis(self.delay_ms),
            dry_run: self.dry_run,
            commit_every: self.commit_every,
            placeholder_marker: self.placeholder_marker.clone(),
            pricing: service.pricing,
        }
    }

    fn database_url(&self) -> Result<String, String> {
        if let Some(url) = &self.database_url {
            return Ok(url.clone());
        }

        let password = self.db_pass.clone().ok_or_else(|| {
            "A database password is required (--db-pass or DATABASE_PASS), \
             or pass --database-url"
                .to_string()
        })?;

        Ok(ConnectionSettings {
            host: self.db_host.clone(),
            port: self.db_port,
            user: self.db_user.clone(),
            password,
            database: self.db_name.clone(),
        }
        .to_url())
    }
}

fn resolve_service(id: &str) -> Result<GeocodingService, String> {
    find_service(id).ok_or_else(|| {
        let available: Vec<String> = enabled_services().into_iter().map(|s| s.id).collect();
        format!(
            "Unknown or disabled provider \"{id}\" (available: {})",
            available.join(", ")
        )
    })
}

fn confirm_lookups(preview: &RunReport) -> Result<bool, dialoguer::Error> {
    Confirm::new()
        .with_prompt(format!(
            "Make {} API call(s) for {} record(s), estimated cost ${:.2}?",
            preview.lookup_clusters, preview.lookup_records, preview.estimated_cost_usd
        ))
        .default(true)
        .interact()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = geofill_cli_utils::init_logger();
    let cli = Cli::parse();

    let service = resolve_service(&cli.provider)?;
    let config = cli.dedup_config(&service);
    config.validate()?;

    let geocoder = if cli.dry_run {
        None
    } else {
        let api_key = cli.api_key.clone().filter(|k| !k.is_empty()).ok_or(
            "An API key is required (--api-key or GOOGLE_MAPS_API_KEY); \
             use --dry-run to preview without one",
        )?;
        Some(build_geocoder(&service, api_key)?)
    };

    if !cli.json {
        println!("TeslaMate Geocoder (grid-deduplicated)");
        println!("Mode: {}", if cli.dry_run { "DRY RUN" } else { "LIVE" });
        println!("Provider: {}", service.name);
        println!();
    }

    log::info!("Connecting to database...");
    let store = PostgresStore::new(db::connect(&cli.database_url()?).await?);

    if !cli.dry_run && !cli.yes && std::io::stdin().is_terminal() {
        let preview_config = DedupConfig {
            dry_run: true,
            ..config.clone()
        };
        let preview = geofill_dedup::run(&store, None, &preview_config, None).await?;
        if preview.lookup_clusters > 0 && !confirm_lookups(&preview)? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let progress = (!cli.dry_run)
        .then(|| geofill_cli_utils::IndicatifProgress::lookups_bar(&multi, "Geocoding"));
    let report = geofill_dedup::run(&store, geocoder.as_deref(), &config, progress).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }

    Ok(())
}
