use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

mod assembly;
mod config;
mod error;
mod geocode;
mod http;
mod output;
mod overpass;

use assembly::{assemble_features, ElementIndex, Mode};
use config::Config;
use geocode::{resolve_area, NominatimClient};
use output::{read_geojson, to_geojson, write_geojson, write_zip, CollectionSummary};
use overpass::{fetch_routes, load_response, save_response, OverpassClient};

#[derive(Parser, Debug)]
#[command(
    name = "osm-transit",
    author,
    version,
    about = "Extract public transit routes and stops for an area from OpenStreetMap",
    long_about = "Resolves an administrative area through Nominatim, fetches every bus, \
                  tram, subway and light rail route relation inside it from Overpass, \
                  and writes the routes (LineString) and their stops (Point) as a single \
                  GeoJSON file packaged into a zip archive.\n\n\
                  Stops shared between routes appear once, listing every route that \
                  serves them."
)]
struct Args {
    /// Administrative area to search for
    #[arg(short, long, env = "OSM_TRANSIT_AREA", default_value = config::DEFAULT_AREA)]
    area: String,

    /// OSM relation id of the area (skips the Nominatim lookup)
    #[arg(short, long)]
    relation_id: Option<i64>,

    /// Nominatim search endpoint
    #[arg(long, env = "OSM_TRANSIT_NOMINATIM_URL", default_value = config::DEFAULT_NOMINATIM_URL)]
    nominatim_url: String,

    /// Overpass interpreter endpoint
    #[arg(long, env = "OSM_TRANSIT_OVERPASS_URL", default_value = config::DEFAULT_OVERPASS_URL)]
    overpass_url: String,

    /// User-Agent sent to both services
    #[arg(long, env = "OSM_TRANSIT_USER_AGENT", default_value = config::DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Preferred language for geocoding results
    #[arg(long, default_value = config::DEFAULT_LANGUAGE)]
    language: String,

    /// Number of geocoding candidates to request
    #[arg(long, default_value_t = config::DEFAULT_CANDIDATE_LIMIT)]
    candidate_limit: u32,

    /// Nominatim request timeout in seconds
    #[arg(long, default_value_t = config::DEFAULT_GEOCODE_TIMEOUT_SECS)]
    geocode_timeout: u64,

    /// Overpass query timeout in seconds (sent as [timeout:N])
    #[arg(long, default_value_t = config::DEFAULT_QUERY_TIMEOUT_SECS)]
    query_timeout: u64,

    /// Extra seconds the HTTP request waits beyond the query timeout
    #[arg(long, default_value_t = config::DEFAULT_TRANSPORT_MARGIN_SECS)]
    transport_margin: u64,

    /// Output GeoJSON file
    #[arg(short, long, default_value = config::DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Output zip archive
    #[arg(long, default_value = config::DEFAULT_ARCHIVE)]
    archive: PathBuf,

    /// Also save the raw Overpass response to this file
    #[arg(long)]
    save_raw: Option<PathBuf>,

    /// Read a saved Overpass response instead of querying the network
    #[arg(long, conflicts_with_all = ["relation_id", "save_raw"])]
    from_raw: Option<PathBuf>,

    /// Verbose output (show debug messages)
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            area_name: self.area,
            relation_id: self.relation_id,
            nominatim_url: self.nominatim_url,
            overpass_url: self.overpass_url,
            user_agent: self.user_agent,
            language: self.language,
            candidate_limit: self.candidate_limit,
            geocode_timeout: Duration::from_secs(self.geocode_timeout),
            query_timeout: Duration::from_secs(self.query_timeout),
            transport_margin: Duration::from_secs(self.transport_margin),
            output: self.output,
            archive: self.archive,
            save_raw: self.save_raw,
            from_raw: self.from_raw,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.verbose { "debug" } else { "info" }),
    )
    .format_timestamp(None)
    .init();

    let config = args.into_config();
    config.validate().context("Invalid configuration")?;

    log::info!("=== OSM Transit Extractor ===");
    log::info!("Output: {}", config.output.display());
    log::info!("Archive: {}", config.archive.display());

    let response = if let Some(raw_path) = &config.from_raw {
        log::info!("");
        log::info!("Phase 1-2: Loading saved Overpass response...");
        let response = load_response(raw_path)
            .with_context(|| format!("Failed to load {}", raw_path.display()))?;
        log::info!("  Loaded {}", raw_path.display());
        response
    } else {
        // Phase 1: Resolve the area
        log::info!("");
        let relation_id = match config.relation_id {
            Some(id) => {
                log::info!("Phase 1: Using relation id {} (--relation-id)", id);
                id
            }
            None => {
                log::info!("Phase 1: Resolving \"{}\" via Nominatim...", config.area_name);
                let geocoder = NominatimClient::new(&config).context("Failed to create geocoding client")?;
                resolve_area(&geocoder, &config).context("Failed to resolve area")?
            }
        };
        log::info!("  Relation id: {}", relation_id);
        log::info!("  Area id: {}", overpass::area_id(relation_id));

        // Phase 2: Fetch route relations
        log::info!("");
        log::info!(
            "Phase 2: Querying Overpass (query timeout {}s, request timeout {}s)...",
            config.query_timeout.as_secs(),
            config.transport_timeout().as_secs()
        );
        let client = OverpassClient::new(&config).context("Failed to create Overpass client")?;
        let response =
            fetch_routes(&client, relation_id, &config).context("Failed to fetch route relations")?;

        if let Some(raw_path) = &config.save_raw {
            save_response(&response, raw_path)
                .with_context(|| format!("Failed to save raw response to {}", raw_path.display()))?;
            log::info!("  Saved raw response to {}", raw_path.display());
        }
        response
    };

    let (nodes, ways, relations) = response.element_counts();
    log::info!(
        "  {} elements ({} nodes, {} ways, {} relations)",
        response.elements.len(),
        nodes,
        ways,
        relations
    );

    // Phase 3: Assemble features
    log::info!("");
    log::info!("Phase 3: Assembling features...");
    let index = ElementIndex::from_elements(response.elements);
    let (collection, stats) = assemble_features(&index);

    let metro_routes = collection
        .routes
        .iter()
        .filter(|r| r.properties.mode == Mode::Metro)
        .count();
    log::info!(
        "  {} routes ({} {}, {} {}), {} stops",
        collection.routes.len(),
        metro_routes,
        Mode::Metro,
        collection.routes.len() - metro_routes,
        Mode::Bus,
        collection.stops.len()
    );
    if collection.is_empty() {
        log::warn!("  No transit features found in this area");
    }

    // Phase 4: Write GeoJSON
    log::info!("");
    log::info!("Phase 4: Writing GeoJSON...");
    let geojson = to_geojson(&collection).context("Failed to build GeoJSON")?;
    write_geojson(&geojson, &config.output).context("Failed to write GeoJSON")?;

    let written = CollectionSummary::from_collection(
        &read_geojson(&config.output).context("Failed to read back GeoJSON")?,
    );
    if written != CollectionSummary::from_collection(&geojson) {
        anyhow::bail!("GeoJSON read back from {} does not match", config.output.display());
    }
    log::info!(
        "  Verified {} features ({} LineString, {} Point)",
        written.total(),
        written.line_strings,
        written.points
    );

    // Phase 5: Package
    log::info!("");
    log::info!("Phase 5: Packaging archive...");
    write_zip(&[config.output.as_path()], &config.archive).context("Failed to write zip archive")?;

    // Summary
    log::info!("");
    stats.log_summary();
    log::info!("");
    log::info!(
        "Output written to: {} and {}",
        config.output.display(),
        config.archive.display()
    );
    log::info!("Done!");

    Ok(())
}
