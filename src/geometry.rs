//! Admin boundary geometry: GeoJSON `FeatureCollection` parsing keyed by the
//! `ADM{lvl}_PCODE` property (spec §6), plus the bounding-box helper
//! `Ingest` uses to slice ensemble rasters to a country's extent.

use std::collections::HashMap;

use geo_types::{Coord, LineString, MultiPolygon, Polygon};
use geojson::{GeoJson, Value as GeoValue};

use crate::error::PipelineError;

/// WGS84 bounding box, inclusive on the min edge per spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

fn ring_from_positions(positions: &[Vec<f64>]) -> LineString<f64> {
    LineString::new(
        positions
            .iter()
            .map(|p| Coord { x: p[0], y: p[1] })
            .collect(),
    )
}

fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Option<Polygon<f64>> {
    let (exterior, interiors) = rings.split_first()?;
    Some(Polygon::new(
        ring_from_positions(exterior),
        interiors.iter().map(|r| ring_from_positions(r)).collect(),
    ))
}

fn value_to_multipolygon(value: &GeoValue) -> Result<MultiPolygon<f64>, PipelineError> {
    match value {
        GeoValue::Polygon(rings) => {
            let polygon = polygon_from_rings(rings)
                .ok_or_else(|| PipelineError::BoundaryMissing("polygon with no exterior ring".into()))?;
            Ok(MultiPolygon::new(vec![polygon]))
        }
        GeoValue::MultiPolygon(polygons) => {
            let polys: Vec<Polygon<f64>> = polygons
                .iter()
                .filter_map(|rings| polygon_from_rings(rings))
                .collect();
            Ok(MultiPolygon::new(polys))
        }
        other => Err(PipelineError::BoundaryMissing(format!(
            "unsupported boundary geometry type: {other:?}"
        ))),
    }
}

/// All admin geometries for a single admin level, keyed by pcode.
pub struct AdminBoundarySet {
    pub adm_level: u8,
    geometries: HashMap<String, MultiPolygon<f64>>,
}

impl AdminBoundarySet {
    /// Parses a GeoJSON `FeatureCollection` where each feature carries an
    /// `ADM{adm_level}_PCODE` property identifying its pcode.
    pub fn from_geojson(adm_level: u8, bytes: &[u8]) -> Result<Self, PipelineError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| PipelineError::BoundaryMissing(format!("boundary JSON is not UTF-8: {e}")))?;
        let parsed: GeoJson = text
            .parse()
            .map_err(|e| PipelineError::BoundaryMissing(format!("invalid boundary GeoJSON: {e}")))?;

        let property_key = format!("ADM{adm_level}_PCODE");
        let mut geometries = HashMap::new();

        let features = match parsed {
            GeoJson::FeatureCollection(fc) => fc.features,
            GeoJson::Feature(f) => vec![f],
            GeoJson::Geometry(_) => {
                return Err(PipelineError::BoundaryMissing(
                    "boundary GeoJSON is a bare geometry, expected a FeatureCollection".into(),
                ))
            }
        };

        for feature in features {
            let pcode = feature
                .properties
                .as_ref()
                .and_then(|p| p.get(&property_key))
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    PipelineError::BoundaryMissing(format!("feature missing property {property_key}"))
                })?
                .to_string();
            let geometry = feature
                .geometry
                .ok_or_else(|| PipelineError::BoundaryMissing(format!("feature {pcode} has no geometry")))?;
            geometries.insert(pcode, value_to_multipolygon(&geometry.value)?);
        }

        Ok(Self { adm_level, geometries })
    }

    pub fn get(&self, pcode: &str) -> Result<&MultiPolygon<f64>, PipelineError> {
        self.geometries
            .get(pcode)
            .ok_or_else(|| PipelineError::BoundaryMissing(pcode.to_string()))
    }

    pub fn pcodes(&self) -> Vec<&str> {
        self.geometries.keys().map(|s| s.as_str()).collect()
    }

    /// Validates that every pcode a station references exists in this
    /// boundary set (spec §9 "back-references… with validation that every
    /// listed pcode exists in the loaded boundaries").
    pub fn validate_pcodes(&self, pcodes: &[String]) -> Result<(), PipelineError> {
        for pcode in pcodes {
            if !self.geometries.contains_key(pcode) {
                return Err(PipelineError::BoundaryMissing(pcode.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FC: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"ADM1_PCODE": "PH1"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0,0.0],[0.0,1.0],[1.0,1.0],[1.0,0.0],[0.0,0.0]]]
                }
            },
            {
                "type": "Feature",
                "properties": {"ADM1_PCODE": "PH2"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[2.0,2.0],[2.0,3.0],[3.0,3.0],[3.0,2.0],[2.0,2.0]]]
                }
            }
        ]
    }"#;

    #[test]
    fn parses_features_by_pcode() {
        let set = AdminBoundarySet::from_geojson(1, FC.as_bytes()).unwrap();
        assert_eq!(set.pcodes().len(), 2);
        assert!(set.get("PH1").is_ok());
        assert!(set.get("PH3").is_err());
    }

    #[test]
    fn validate_pcodes_rejects_unknown() {
        let set = AdminBoundarySet::from_geojson(1, FC.as_bytes()).unwrap();
        assert!(set.validate_pcodes(&["PH1".to_string()]).is_ok());
        assert!(set.validate_pcodes(&["PH9".to_string()]).is_err());
    }
}
