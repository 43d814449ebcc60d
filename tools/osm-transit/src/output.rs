use crate::assembly::{self, RouteFeature, StopFeature};
use crate::error::{Result, TransitError};
use geo::Coord;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

fn position(coord: &Coord<f64>) -> Vec<f64> {
    vec![coord.x, coord.y]
}

fn properties<T: Serialize>(props: &T) -> Result<JsonObject> {
    match serde_json::to_value(props) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Ok(JsonObject::new()),
        Err(source) => Err(TransitError::Serialize {
            context: "feature properties",
            source,
        }),
    }
}

fn feature(value: Value, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn route_to_feature(route: &RouteFeature) -> Result<Feature> {
    let line = route.coords.iter().map(position).collect();
    Ok(feature(Value::LineString(line), properties(&route.properties)?))
}

fn stop_to_feature(stop: &StopFeature) -> Result<Feature> {
    Ok(feature(
        Value::Point(position(&stop.coord)),
        properties(&stop.properties)?,
    ))
}

/// Convert assembled features to GeoJSON, lines first then points
pub fn to_geojson(fc: &assembly::FeatureCollection) -> Result<FeatureCollection> {
    let mut features = Vec::with_capacity(fc.len());
    for route in &fc.routes {
        features.push(route_to_feature(route)?);
    }
    for stop in &fc.stops {
        features.push(stop_to_feature(stop)?);
    }

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

/// Write a feature collection as pretty-printed UTF-8 GeoJSON
pub fn write_geojson(fc: &FeatureCollection, output_path: &Path) -> Result<()> {
    log::info!(
        "Writing {} features to {}",
        fc.features.len(),
        output_path.display()
    );

    let file = File::create(output_path).map_err(|e| TransitError::io(output_path, e))?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, fc).map_err(|source| TransitError::Serialize {
        context: "GeoJSON",
        source,
    })?;
    writer
        .write_all(b"\n")
        .and_then(|_| writer.flush())
        .map_err(|e| TransitError::io(output_path, e))?;

    Ok(())
}

/// Read a GeoJSON feature collection back from disk
pub fn read_geojson(path: &Path) -> Result<FeatureCollection> {
    let file = File::open(path).map_err(|e| TransitError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| TransitError::Document {
        path: path.to_path_buf(),
        source,
    })
}

/// Package files into a deflate-compressed zip. Entries carry only the
/// base file name.
pub fn write_zip(files: &[&Path], zip_path: &Path) -> Result<()> {
    log::info!("Packaging {} file(s) into {}", files.len(), zip_path.display());

    let archive = File::create(zip_path).map_err(|e| TransitError::io(zip_path, e))?;
    let mut zip = ZipWriter::new(BufWriter::new(archive));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TransitError::InvalidConfig(format!("{} has no file name", path.display())))?;

        zip.start_file(name.as_str(), options)?;
        let mut source = File::open(path).map_err(|e| TransitError::io(path, e))?;
        io::copy(&mut source, &mut zip).map_err(|e| TransitError::io(path, e))?;
        log::debug!("  Added {}", name);
    }

    let mut writer = zip.finish()?;
    writer.flush().map_err(|e| TransitError::io(zip_path, e))?;

    Ok(())
}

/// Shape of a written collection, used to check a round trip
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CollectionSummary {
    pub line_strings: usize,
    pub points: usize,
    pub other: usize,
    pub property_keys: BTreeSet<String>,
}

impl CollectionSummary {
    pub fn from_collection(fc: &FeatureCollection) -> Self {
        let mut summary = Self::default();
        for feature in &fc.features {
            match feature.geometry.as_ref().map(|g| &g.value) {
                Some(Value::LineString(_)) => summary.line_strings += 1,
                Some(Value::Point(_)) => summary.points += 1,
                _ => summary.other += 1,
            }
            if let Some(props) = &feature.properties {
                summary.property_keys.extend(props.keys().cloned());
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.line_strings + self.points + self.other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::tests::line_one;
    use crate::assembly::{assemble_features, ElementIndex};
    use std::io::Read;

    fn sample() -> FeatureCollection {
        let (fc, _) = assemble_features(&ElementIndex::from_elements(line_one()));
        to_geojson(&fc).unwrap()
    }

    fn geometry_type(feature: &Feature) -> &'static str {
        match feature.geometry.as_ref().map(|g| &g.value) {
            Some(Value::LineString(_)) => "LineString",
            Some(Value::Point(_)) => "Point",
            _ => "other",
        }
    }

    #[test]
    fn test_lines_before_points() {
        let fc = sample();

        assert_eq!(fc.features.len(), 2);
        assert_eq!(geometry_type(&fc.features[0]), "LineString");
        assert_eq!(geometry_type(&fc.features[1]), "Point");

        match &fc.features[0].geometry.as_ref().unwrap().value {
            Value::LineString(line) => assert_eq!(line, &vec![vec![0.0, 0.0], vec![1.0, 1.0]]),
            _ => panic!("Expected LineString value"),
        }
    }

    #[test]
    fn test_feature_properties() {
        let fc = sample();

        let route = fc.features[0].properties.as_ref().unwrap();
        assert_eq!(route["mode"], "bus");
        assert_eq!(route["name"], "Line 1");
        assert_eq!(route["osm_relation_id"], 10);
        assert!(route["operator"].is_null());

        let stop = fc.features[1].properties.as_ref().unwrap();
        assert_eq!(stop["stop_id"], "S1");
        assert_eq!(stop["routes"], serde_json::json!(["10"]));
        assert_eq!(stop["tags"]["ref"], "S1");
        assert_eq!(stop["sequence"], 1);
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transport.geojson");
        let fc = sample();

        write_geojson(&fc, &path).unwrap();
        let loaded = read_geojson(&path).unwrap();

        assert_eq!(loaded.features.len(), fc.features.len());
        for (written, read) in fc.features.iter().zip(&loaded.features) {
            assert_eq!(geometry_type(written), geometry_type(read));
            let written_keys: Vec<_> = written.properties.as_ref().unwrap().keys().collect();
            let read_keys: Vec<_> = read.properties.as_ref().unwrap().keys().collect();
            assert_eq!(written_keys, read_keys);
        }
        assert_eq!(
            CollectionSummary::from_collection(&loaded),
            CollectionSummary::from_collection(&fc)
        );
    }

    #[test]
    fn test_non_ascii_written_literally() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("names.geojson");

        let mut props = JsonObject::new();
        props.insert("stop_name".into(), serde_json::json!("天河客运站"));
        let fc = FeatureCollection {
            bbox: None,
            features: vec![feature(Value::Point(vec![113.4, 23.2]), props)],
            foreign_members: None,
        };

        write_geojson(&fc, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();

        assert!(text.contains("天河客运站"));
        assert!(!text.contains("\\u"));
        assert!(text.contains("\"FeatureCollection\""));
    }

    #[test]
    fn test_zip_uses_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        let geojson_path = nested.join("tianhe_transport.geojson");
        let zip_path = dir.path().join("tianhe_transport.zip");

        write_geojson(&sample(), &geojson_path).unwrap();
        write_zip(&[geojson_path.as_path()], &zip_path).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 1);

        let mut entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "tianhe_transport.geojson");

        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, std::fs::read_to_string(&geojson_path).unwrap());
    }

    #[test]
    fn test_summary_counts() {
        let summary = CollectionSummary::from_collection(&sample());

        assert_eq!(summary.line_strings, 1);
        assert_eq!(summary.points, 1);
        assert_eq!(summary.total(), 2);
        assert!(summary.property_keys.contains("route_id"));
        assert!(summary.property_keys.contains("stop_id"));
    }
}
