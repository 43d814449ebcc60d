use crate::overpass::{Element, MemberType, Node, Relation, Tags, Way, TRANSIT_ROUTE_TYPES};
use geo::Coord;
use hashbrown::HashMap;
use serde::Serialize;

/// Member roles that mark a node as a stop
const STOP_ROLES: [&str; 4] = ["stop", "stop_exit", "platform", ""];

/// Service mode of a route, derived from its `route` tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    Metro,
    Bus,
}

impl Mode {
    /// Mode for a transit `route` value, or `None` when the value is not a
    /// transit route this tool extracts. Matching is case-insensitive.
    pub fn from_route(route: &str) -> Option<Self> {
        let route = route.to_lowercase();
        if !TRANSIT_ROUTE_TYPES.contains(&route.as_str()) {
            return None;
        }
        match route.as_str() {
            "subway" | "light_rail" => Some(Mode::Metro),
            _ => Some(Mode::Bus),
        }
    }
}

/// Nodes, ways and route relations from one Overpass response
#[derive(Default)]
pub struct ElementIndex {
    pub nodes: HashMap<i64, Node>,
    pub ways: HashMap<i64, Way>,
    pub relations: Vec<Relation>,
}

impl ElementIndex {
    pub fn from_elements(elements: Vec<Element>) -> Self {
        let mut index = Self::default();
        let mut unknown = 0usize;

        for element in elements {
            match element {
                Element::Node(node) => {
                    index.nodes.insert(node.id, node);
                }
                Element::Way(way) => {
                    index.ways.insert(way.id, way);
                }
                Element::Relation(rel) => index.relations.push(rel),
                Element::Unknown => unknown += 1,
            }
        }

        if unknown > 0 {
            log::debug!("  Ignored {} elements of unexpected type", unknown);
        }

        index
    }

    pub fn coord(&self, node_id: i64) -> Option<Coord<f64>> {
        self.nodes.get(&node_id).map(Node::coord)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteProperties {
    pub mode: Mode,
    pub network: Option<String>,
    pub route_id: String,
    pub name: String,
    pub operator: Option<String>,
    pub osm_relation_id: i64,
    pub route: String,
    pub colour: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteFeature {
    pub coords: Vec<Coord<f64>>,
    pub properties: RouteProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopProperties {
    pub mode: Mode,
    pub stop_id: String,
    pub stop_name: Option<String>,
    pub osm_node_id: i64,
    /// Position among the stops of the relation that first created it
    pub sequence: u32,
    pub routes: Vec<String>,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopFeature {
    pub coord: Coord<f64>,
    pub properties: StopProperties,
}

/// Assembled routes and stops. Routes always precede stops.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    pub routes: Vec<RouteFeature>,
    pub stops: Vec<StopFeature>,
}

impl FeatureCollection {
    pub fn len(&self) -> usize {
        self.routes.len() + self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Counters collected during assembly
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AssemblyStats {
    pub relations: usize,
    pub skipped_relations: usize,
    pub relations_without_geometry: usize,
    pub route_features: usize,
    pub stop_features: usize,
    pub merged_stop_refs: usize,
    pub unresolved_refs: usize,
}

impl AssemblyStats {
    pub fn log_summary(&self) {
        log::info!("=== Summary ===");
        log::info!("Relations in response: {}", self.relations);
        log::info!("  Skipped (not a transit route): {}", self.skipped_relations);
        log::info!("  Without geometry: {}", self.relations_without_geometry);
        log::info!("Route features: {}", self.route_features);
        log::info!("Stop features: {}", self.stop_features);
        log::info!("  Stop references merged: {}", self.merged_stop_refs);
        if self.unresolved_refs > 0 {
            log::warn!("Unresolved node/way references: {}", self.unresolved_refs);
        }
    }
}

/// Non-empty tag value. An empty value counts as missing, so a chain of
/// fallbacks whose tags are all empty yields `None` rather than `""`.
fn tag<'a>(tags: &'a Tags, key: &str) -> Option<&'a str> {
    tags.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

fn is_stop_member(kind: MemberType, role: &str) -> bool {
    kind == MemberType::Node && STOP_ROLES.contains(&role)
}

fn route_properties(rel: &Relation, mode: Mode, route: &str) -> RouteProperties {
    let tags = &rel.tags;
    let route_id = tag(tags, "ref")
        .map(str::to_string)
        .unwrap_or_else(|| rel.id.to_string());
    let name = tag(tags, "name")
        .or_else(|| tag(tags, "ref"))
        .map(str::to_string)
        .unwrap_or_else(|| format!("route/{}", rel.id));

    RouteProperties {
        mode,
        network: tag(tags, "network")
            .or_else(|| tag(tags, "operator"))
            .map(str::to_string),
        route_id,
        name,
        operator: tags.get("operator").cloned(),
        osm_relation_id: rel.id,
        route: route.to_string(),
        colour: tag(tags, "colour")
            .or_else(|| tag(tags, "line"))
            .map(str::to_string),
    }
}

/// Resolve the line geometry of a route relation.
///
/// Way members contribute every node that resolves, in order. When no way
/// yields coordinates, stop-role node members are used instead. Consecutive
/// duplicate coordinates are collapsed.
pub fn route_geometry(rel: &Relation, index: &ElementIndex, stats: &mut AssemblyStats) -> Vec<Coord<f64>> {
    let mut coords = Vec::new();
    let mut fallback = Vec::new();

    for member in &rel.members {
        match member.kind {
            MemberType::Way => match index.ways.get(&member.reference) {
                Some(way) => {
                    for &node_id in &way.nodes {
                        match index.coord(node_id) {
                            Some(coord) => coords.push(coord),
                            None => stats.unresolved_refs += 1,
                        }
                    }
                }
                None => stats.unresolved_refs += 1,
            },
            MemberType::Node if is_stop_member(member.kind, &member.role) => {
                match index.coord(member.reference) {
                    Some(coord) => fallback.push(coord),
                    None => stats.unresolved_refs += 1,
                }
            }
            _ => {}
        }
    }

    if coords.is_empty() {
        coords = fallback;
    }

    coords.dedup();
    coords
}

/// Stop features keyed by node id. Each node owns one feature; later
/// references only extend its route list.
#[derive(Default)]
struct StopRegistry {
    stops: Vec<StopFeature>,
    seen: HashMap<i64, usize>,
    merged: usize,
}

impl StopRegistry {
    fn visit_relation(&mut self, rel: &Relation, mode: Mode, route_id: &str, index: &ElementIndex) {
        let mut sequence = 1u32;

        for member in &rel.members {
            if !is_stop_member(member.kind, &member.role) {
                continue;
            }
            let Some(node) = index.nodes.get(&member.reference) else {
                continue;
            };

            if let Some(&slot) = self.seen.get(&node.id) {
                self.stops[slot].properties.routes.push(route_id.to_string());
                self.merged += 1;
            } else {
                self.seen.insert(node.id, self.stops.len());
                self.stops.push(StopFeature {
                    coord: node.coord(),
                    properties: StopProperties {
                        mode,
                        stop_id: tag(&node.tags, "ref")
                            .map(str::to_string)
                            .unwrap_or_else(|| node.id.to_string()),
                        stop_name: node.tags.get("name").cloned(),
                        osm_node_id: node.id,
                        sequence,
                        routes: vec![route_id.to_string()],
                        tags: node.tags.clone(),
                    },
                });
            }
            sequence += 1;
        }
    }
}

/// Turn an element index into route lines followed by stop points
pub fn assemble_features(index: &ElementIndex) -> (FeatureCollection, AssemblyStats) {
    let mut stats = AssemblyStats::default();
    let mut routes = Vec::new();
    let mut registry = StopRegistry::default();

    for rel in &index.relations {
        stats.relations += 1;

        let route = rel.tags.get("route").map(String::as_str).unwrap_or("");
        let Some(mode) = Mode::from_route(route) else {
            log::debug!("  Skipping relation {} (route={:?})", rel.id, route);
            stats.skipped_relations += 1;
            continue;
        };

        let properties = route_properties(rel, mode, route);
        let coords = route_geometry(rel, index, &mut stats);

        if coords.is_empty() {
            log::debug!("  Relation {} ({}) has no resolvable geometry", rel.id, properties.name);
            stats.relations_without_geometry += 1;
        }

        registry.visit_relation(rel, mode, &properties.route_id, index);

        if !coords.is_empty() {
            routes.push(RouteFeature { coords, properties });
        }
    }

    stats.route_features = routes.len();
    stats.stop_features = registry.stops.len();
    stats.merged_stop_refs = registry.merged;

    let collection = FeatureCollection {
        routes,
        stops: registry.stops,
    };
    (collection, stats)
}
