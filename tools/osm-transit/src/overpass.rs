use crate::config::Config;
use crate::error::{Result, TransitError};
use crate::http::{build_client, read_json, spinner};
use geo::Coord;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Overpass derives area ids from relation ids by this offset
pub const AREA_ID_OFFSET: i64 = 3_600_000_000;

/// Route types requested from Overpass
pub const TRANSIT_ROUTE_TYPES: [&str; 4] = ["bus", "tram", "subway", "light_rail"];

/// Tag storage type. Ordered so serialized tags are stable.
pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
}

impl Node {
    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Way {
    pub id: i64,
    #[serde(default)]
    pub nodes: Vec<i64>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberType {
    Node,
    Way,
    Relation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    #[serde(rename = "type")]
    pub kind: MemberType,
    #[serde(rename = "ref")]
    pub reference: i64,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: i64,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    Node(Node),
    Way(Way),
    Relation(Relation),
    /// Element types this tool never asks for (e.g. `area`)
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<Element>,
    /// Set by Overpass when a query failed or was cut short at runtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

impl OverpassResponse {
    /// Count of (nodes, ways, relations)
    pub fn element_counts(&self) -> (usize, usize, usize) {
        self.elements
            .iter()
            .fold((0, 0, 0), |(n, w, r), element| match element {
                Element::Node(_) => (n + 1, w, r),
                Element::Way(_) => (n, w + 1, r),
                Element::Relation(_) => (n, w, r + 1),
                Element::Unknown => (n, w, r),
            })
    }
}

pub fn area_id(relation_id: i64) -> i64 {
    AREA_ID_OFFSET + relation_id
}

/// Build an Overpass QL query for all transit route relations inside the
/// area derived from `relation_id`, recursing down to member ways and nodes.
pub fn build_query(relation_id: i64, timeout_secs: u64) -> String {
    format!(
        "[out:json][timeout:{timeout}];\n\
         area({area})->.searchArea;\n\
         (\n  relation[\"type\"=\"route\"][\"route\"~\"{routes}\"](area.searchArea);\n);\n\
         out body;\n\
         >;\n\
         out skel qt;\n",
        timeout = timeout_secs,
        area = area_id(relation_id),
        routes = TRANSIT_ROUTE_TYPES.join("|"),
    )
}

/// Executes Overpass QL queries
pub trait OverpassApi {
    fn interpret(&self, query: &str) -> Result<OverpassResponse>;
}

/// Overpass API client posting to an `/interpreter` endpoint
pub struct OverpassClient {
    http: Client,
    url: String,
}

impl OverpassClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: build_client(&config.user_agent, config.transport_timeout())?,
            url: config.overpass_url.clone(),
        })
    }
}

impl OverpassApi for OverpassClient {
    fn interpret(&self, query: &str) -> Result<OverpassResponse> {
        let pb = spinner(format!("Waiting for {}...", self.url));
        let response = self.http.post(&self.url).form(&[("data", query)]).send();
        pb.finish_and_clear();

        read_json(response?, "Overpass")
    }
}

/// Fetch every transit route relation within the area of `relation_id`
pub fn fetch_routes<A: OverpassApi + ?Sized>(
    api: &A,
    relation_id: i64,
    config: &Config,
) -> Result<OverpassResponse> {
    let query = build_query(relation_id, config.query_timeout.as_secs());
    log::debug!("Overpass query:\n{}", query);

    let response = api.interpret(&query)?;
    if let Some(remark) = &response.remark {
        log::warn!("  Overpass remark: {}", remark);
    }
    Ok(response)
}

/// Save a response as JSON for later offline runs
pub fn save_response(response: &OverpassResponse, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| TransitError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, response).map_err(|source| TransitError::Serialize {
        context: "Overpass response",
        source,
    })?;
    writer.flush().map_err(|e| TransitError::io(path, e))?;
    Ok(())
}

/// Load a response previously written by [`save_response`] or saved from
/// the Overpass web interface
pub fn load_response(path: &Path) -> Result<OverpassResponse> {
    let file = File::open(path).map_err(|e| TransitError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| TransitError::Document {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct RecordingApi {
        response: OverpassResponse,
        queries: RefCell<Vec<String>>,
    }

    impl OverpassApi for RecordingApi {
        fn interpret(&self, query: &str) -> Result<OverpassResponse> {
            self.queries.borrow_mut().push(query.to_string());
            Ok(self.response.clone())
        }
    }

    const SAMPLE: &str = r#"{
        "version": 0.6,
        "generator": "Overpass API",
        "elements": [
            {"type": "relation", "id": 10, "members": [
                {"type": "way", "ref": 20, "role": ""},
                {"type": "node", "ref": 1, "role": "stop"}
            ], "tags": {"type": "route", "route": "bus", "name": "Line 1"}},
            {"type": "way", "id": 20, "nodes": [1, 2]},
            {"type": "node", "id": 1, "lat": 23.13, "lon": 113.36, "tags": {"name": "岗顶"}},
            {"type": "node", "id": 2, "lat": 23.25, "lon": 113.5},
            {"type": "area", "id": 3600000001}
        ]
    }"#;

    #[test]
    fn test_area_id_offset() {
        assert_eq!(area_id(3_457_426), 3_603_457_426);
    }

    #[test]
    fn test_build_query() {
        let query = build_query(3_457_426, 180);

        assert!(query.starts_with("[out:json][timeout:180];"));
        assert!(query.contains("area(3603457426)->.searchArea;"));
        assert!(query.contains(
            r#"relation["type"="route"]["route"~"bus|tram|subway|light_rail"](area.searchArea);"#
        ));
        assert!(query.contains("out body;\n>;\nout skel qt;"));
    }

    #[test]
    fn test_parse_response() {
        let response: OverpassResponse = serde_json::from_str(SAMPLE).unwrap();

        assert_eq!(response.elements.len(), 5);
        assert_eq!(response.element_counts(), (2, 1, 1));
        assert_eq!(response.elements[4], Element::Unknown);

        match &response.elements[0] {
            Element::Relation(rel) => {
                assert_eq!(rel.members.len(), 2);
                assert_eq!(rel.members[0].kind, MemberType::Way);
                assert_eq!(rel.members[1].role, "stop");
                assert_eq!(rel.tags.get("name").map(String::as_str), Some("Line 1"));
            }
            other => panic!("Expected relation, got {:?}", other),
        }

        match &response.elements[3] {
            Element::Node(node) => {
                assert!(node.tags.is_empty());
                assert_eq!(node.coord(), Coord { x: 113.5, y: 23.25 });
            }
            other => panic!("Expected node, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_response() {
        let result: std::result::Result<OverpassResponse, _> =
            serde_json::from_str(r#"{"elements": [{"type": "node", "id": "x"}]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_fetch_routes_sends_query() {
        let api = RecordingApi {
            response: serde_json::from_str(SAMPLE).unwrap(),
            queries: RefCell::new(Vec::new()),
        };
        let config = Config::default();

        let response = fetch_routes(&api, 42, &config).unwrap();
        assert_eq!(response.elements.len(), 5);

        let queries = api.queries.borrow();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains("[timeout:180]"));
        assert!(queries[0].contains("area(3600000042)"));
    }

    #[test]
    fn test_save_and_load_response() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.json");
        let response: OverpassResponse = serde_json::from_str(SAMPLE).unwrap();

        save_response(&response, &path).unwrap();
        let loaded = load_response(&path).unwrap();

        assert_eq!(loaded.element_counts(), response.element_counts());
        assert_eq!(loaded.elements[0], response.elements[0]);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_response(&dir.path().join("missing.json"));
        assert!(matches!(result, Err(TransitError::Io { .. })));
    }
}
