use crate::error::{Result, TransitError};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_AREA: &str = "天河区 广州";
pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
pub const DEFAULT_USER_AGENT: &str = concat!("osm-transit/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_LANGUAGE: &str = "zh-CN";
pub const DEFAULT_CANDIDATE_LIMIT: u32 = 5;
pub const DEFAULT_GEOCODE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_TRANSPORT_MARGIN_SECS: u64 = 30;
pub const DEFAULT_OUTPUT: &str = "tianhe_transport.geojson";
pub const DEFAULT_ARCHIVE: &str = "tianhe_transport.zip";

/// Settings shared by every pipeline stage.
#[derive(Debug, Clone)]
pub struct Config {
    /// Free-text administrative area passed to the geocoder
    pub area_name: String,
    /// Known relation id; skips geocoding when set
    pub relation_id: Option<i64>,
    pub nominatim_url: String,
    pub overpass_url: String,
    pub user_agent: String,
    pub language: String,
    pub candidate_limit: u32,
    pub geocode_timeout: Duration,
    /// Embedded in the query text as `[timeout:N]`
    pub query_timeout: Duration,
    /// Added on top of `query_timeout` for the HTTP request itself
    pub transport_margin: Duration,
    pub output: PathBuf,
    pub archive: PathBuf,
    pub save_raw: Option<PathBuf>,
    pub from_raw: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            area_name: DEFAULT_AREA.to_string(),
            relation_id: None,
            nominatim_url: DEFAULT_NOMINATIM_URL.to_string(),
            overpass_url: DEFAULT_OVERPASS_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            geocode_timeout: Duration::from_secs(DEFAULT_GEOCODE_TIMEOUT_SECS),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            transport_margin: Duration::from_secs(DEFAULT_TRANSPORT_MARGIN_SECS),
            output: PathBuf::from(DEFAULT_OUTPUT),
            archive: PathBuf::from(DEFAULT_ARCHIVE),
            save_raw: None,
            from_raw: None,
        }
    }
}

impl Config {
    /// HTTP timeout for the Overpass request, always longer than the
    /// server-side query timeout.
    pub fn transport_timeout(&self) -> Duration {
        self.query_timeout + self.transport_margin
    }

    pub fn validate(&self) -> Result<()> {
        if self.query_timeout.as_secs() == 0 {
            return Err(TransitError::InvalidConfig(
                "query timeout must be at least one second".into(),
            ));
        }
        if self.transport_margin.is_zero() {
            return Err(TransitError::InvalidConfig(
                "transport margin must be greater than zero".into(),
            ));
        }
        if self.candidate_limit == 0 {
            return Err(TransitError::InvalidConfig(
                "candidate limit must be greater than zero".into(),
            ));
        }
        if self.relation_id.is_none() && self.from_raw.is_none() && self.area_name.trim().is_empty() {
            return Err(TransitError::InvalidConfig(
                "an area name, a relation id or a raw input file is required".into(),
            ));
        }
        if self.output.file_name().is_none() {
            return Err(TransitError::InvalidConfig(format!(
                "output path has no file name: {}",
                self.output.display()
            )));
        }
        Ok(())
    }
}
