use crate::config::Config;
use crate::error::{Result, TransitError};
use crate::http::{build_client, read_json, spinner};
use reqwest::blocking::Client;
use serde::{Deserialize, Deserializer};

/// Parameters of a single geocoding search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery<'a> {
    pub text: &'a str,
    pub limit: u32,
    pub language: &'a str,
}

/// One geocoding candidate. Only the fields used for area selection are kept.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Place {
    #[serde(default)]
    pub osm_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_osm_id")]
    pub osm_id: Option<i64>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl Place {
    pub fn is_relation(&self) -> bool {
        self.osm_type.as_deref() == Some("relation")
    }
}

/// Nominatim has emitted `osm_id` both as a number and as a string
fn deserialize_osm_id<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    Ok(match Option::<RawId>::deserialize(deserializer)? {
        Some(RawId::Number(id)) => Some(id),
        Some(RawId::Text(text)) => text.trim().parse().ok(),
        None => None,
    })
}

/// Free-text place search
pub trait Geocoder {
    fn search(&self, query: &SearchQuery<'_>) -> Result<Vec<Place>>;
}

/// Geocoder backed by a Nominatim `/search` endpoint
pub struct NominatimClient {
    http: Client,
    url: String,
}

impl NominatimClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: build_client(&config.user_agent, config.geocode_timeout)?,
            url: config.nominatim_url.clone(),
        })
    }
}

impl Geocoder for NominatimClient {
    fn search(&self, query: &SearchQuery<'_>) -> Result<Vec<Place>> {
        let limit = query.limit.to_string();
        let pb = spinner(format!("Searching Nominatim for \"{}\"...", query.text));

        let response = self
            .http
            .get(&self.url)
            .query(&[
                ("q", query.text),
                ("format", "json"),
                ("limit", limit.as_str()),
                ("accept-language", query.language),
            ])
            .send();

        pb.finish_and_clear();
        read_json(response?, "Nominatim")
    }
}

/// Pick the relation id out of a candidate list.
///
/// The first relation-typed candidate wins. Failing that, the first
/// candidate is accepted only when it is itself a relation.
pub fn select_relation(places: &[Place]) -> Option<i64> {
    places
        .iter()
        .find(|place| place.is_relation() && place.osm_id.is_some())
        .and_then(|place| place.osm_id)
        .or_else(|| {
            places
                .first()
                .filter(|place| place.is_relation())
                .and_then(|place| place.osm_id)
        })
}

/// Resolve the configured area name to an OSM relation id
pub fn resolve_area<G: Geocoder + ?Sized>(geocoder: &G, config: &Config) -> Result<i64> {
    let query = SearchQuery {
        text: &config.area_name,
        limit: config.candidate_limit,
        language: &config.language,
    };

    let places = geocoder.search(&query)?;
    log::debug!("  Geocoder returned {} candidates", places.len());
    for place in &places {
        log::debug!(
            "    {} {} ({}) {}",
            place.osm_type.as_deref().unwrap_or("?"),
            place.osm_id.map(|id| id.to_string()).unwrap_or_default(),
            place.kind.as_deref().unwrap_or("-"),
            place.display_name.as_deref().unwrap_or("")
        );
    }

    select_relation(&places).ok_or_else(|| TransitError::AreaNotFound {
        name: config.area_name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct FixedGeocoder {
        places: Vec<Place>,
        queries: RefCell<Vec<(String, u32, String)>>,
    }

    impl FixedGeocoder {
        fn new(places: Vec<Place>) -> Self {
            Self {
                places,
                queries: RefCell::new(Vec::new()),
            }
        }
    }

    impl Geocoder for FixedGeocoder {
        fn search(&self, query: &SearchQuery<'_>) -> Result<Vec<Place>> {
            self.queries.borrow_mut().push((
                query.text.to_string(),
                query.limit,
                query.language.to_string(),
            ));
            Ok(self.places.clone())
        }
    }

    fn place(osm_type: &str, osm_id: i64) -> Place {
        Place {
            osm_type: Some(osm_type.to_string()),
            osm_id: Some(osm_id),
            ..Place::default()
        }
    }

    #[test]
    fn test_first_relation_wins() {
        let places = vec![place("node", 1), place("relation", 2), place("relation", 3)];
        assert_eq!(select_relation(&places), Some(2));
    }

    #[test]
    fn test_no_relation_candidates() {
        let places = vec![place("node", 1), place("way", 2)];
        assert_eq!(select_relation(&places), None);
        assert_eq!(select_relation(&[]), None);
    }

    #[test]
    fn test_resolve_area_passes_query_settings() {
        let geocoder = FixedGeocoder::new(vec![place("relation", 3_457_426)]);
        let config = Config::default();

        let id = resolve_area(&geocoder, &config).unwrap();
        assert_eq!(id, 3_457_426);

        let queries = geocoder.queries.borrow();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0], ("天河区 广州".to_string(), 5, "zh-CN".to_string()));
    }

    #[test]
    fn test_resolve_area_not_found() {
        let geocoder = FixedGeocoder::new(vec![]);
        let config = Config {
            area_name: "Nowhere".into(),
            ..Config::default()
        };

        match resolve_area(&geocoder, &config) {
            Err(TransitError::AreaNotFound { name }) => assert_eq!(name, "Nowhere"),
            other => panic!("Expected AreaNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_place_deserialize() {
        let json = r#"[
            {"place_id": 1, "osm_type": "relation", "osm_id": 3457426, "display_name": "天河区, 广州市", "class": "boundary", "type": "administrative"},
            {"osm_type": "node", "osm_id": "42"}
        ]"#;
        let places: Vec<Place> = serde_json::from_str(json).unwrap();

        assert_eq!(places.len(), 2);
        assert!(places[0].is_relation());
        assert_eq!(places[0].osm_id, Some(3_457_426));
        assert_eq!(places[0].kind.as_deref(), Some("administrative"));
        assert_eq!(places[1].osm_id, Some(42));
        assert!(!places[1].is_relation());
    }
}
