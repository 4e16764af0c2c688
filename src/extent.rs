//! ExtentBuilder: composes per-lead-time flood-extent rasters from the
//! global per-return-period inundation maps and the triggered admin units
//! (spec §4.4).

use std::collections::HashMap;

use crate::error::PipelineError;
use crate::geometry::AdminBoundarySet;
use crate::model::ForecastAdminDataset;
use crate::raster::Grid;

/// The seven global per-return-period inundation maps, held sorted
/// ascending by return period so the "smallest available" fallback is a
/// simple first-element lookup.
pub struct FloodMapSet {
    rasters: Vec<(f64, Grid)>,
}

impl FloodMapSet {
    pub fn new(mut rasters: Vec<(f64, Grid)>) -> Result<Self, PipelineError> {
        if rasters.is_empty() {
            return Err(PipelineError::ConfigMissing("no global flood maps loaded".into()));
        }
        rasters.sort_by(|a, b| a.0.partial_cmp(&b.0).expect("return periods are not NaN"));
        Ok(Self { rasters })
    }

    /// The raster for an exact return period, or the smallest available one
    /// as a conservative fallback (spec §4.4 step 2).
    pub fn for_return_period(&self, rp: f64) -> &Grid {
        self.rasters
            .iter()
            .find(|(r, _)| *r == rp)
            .or_else(|| self.rasters.first())
            .map(|(_, g)| g)
            .expect("FloodMapSet is never constructed empty")
    }

    fn template(&self) -> &Grid {
        &self.rasters[0].1
    }
}

/// The per-run set of flood-extent rasters: one per lead time, plus the
/// all-zero `empty` template used wherever no unit triggered.
pub struct ExtentSet {
    pub empty: Grid,
    per_lead_time: HashMap<u8, Grid>,
}

impl ExtentSet {
    pub fn get(&self, lead_time: u8) -> &Grid {
        self.per_lead_time.get(&lead_time).unwrap_or(&self.empty)
    }

    pub fn lead_times_with_extent(&self) -> impl Iterator<Item = &u8> {
        self.per_lead_time.keys()
    }
}

pub struct ExtentBuilder;

impl ExtentBuilder {
    /// `boundaries` must be the admin boundary set for `forecast_admin`'s
    /// deepest configured admin level (spec §4.4 "the deepest available
    /// admin level").
    pub fn build(
        forecast_admin: &ForecastAdminDataset,
        boundaries: &AdminBoundarySet,
        flood_maps: &FloodMapSet,
    ) -> Result<ExtentSet, PipelineError> {
        let empty = flood_maps.template().zeros_like();
        let mut per_lead_time = HashMap::new();

        for lead_time in 0..=7u8 {
            let triggered: Vec<_> = forecast_admin
                .list_by_lead_time(lead_time)
                .into_iter()
                .filter(|u| u.triggered && u.adm_level == boundaries.adm_level)
                .collect();

            if triggered.is_empty() {
                continue;
            }

            let mut layers = vec![empty.clone()];
            for unit in triggered {
                let polygon = boundaries.get(&unit.pcode)?;
                let raster = flood_maps.for_return_period(unit.return_period);
                layers.push(raster.mask_to_polygon(polygon));
            }
            let merged = Grid::merge_max(layers.iter())
                .map_err(|e| PipelineError::ConfigMissing(format!("extent merge failed: {e}")))?;
            per_lead_time.insert(lead_time, merged);
        }

        Ok(ExtentSet { empty, per_lead_time })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AdminDataset, ForecastAdmin, Forecast};
    use chrono::Utc;

    fn grid(fill: f64) -> Grid {
        Grid {
            width: 2,
            height: 2,
            geo_transform: [0.0, 1.0, 0.0, 2.0, 0.0, -1.0],
            projection_wkt: "EPSG:4326".into(),
            nodata: -9999.0,
            data: vec![fill; 4],
        }
    }

    fn boundaries() -> AdminBoundarySet {
        let fc = r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{"ADM1_PCODE":"PH1"},"geometry":{"type":"Polygon","coordinates":[[[0.0,0.0],[0.0,2.0],[2.0,2.0],[2.0,0.0],[0.0,0.0]]]}}]}"#;
        AdminBoundarySet::from_geojson(1, fc.as_bytes()).unwrap()
    }

    fn forecast_admin(triggered: bool, return_period: f64) -> ForecastAdminDataset {
        let mut ds: ForecastAdminDataset = AdminDataset::new("PHL", Utc::now(), vec![1]);
        ds.upsert(ForecastAdmin {
            adm_level: 1,
            pcode: "PH1".into(),
            lead_time: 2,
            forecasts: vec![Forecast { return_period, likelihood: 1.0 }],
            triggered,
            return_period,
            alert_class: crate::model::AlertClass::Med,
            pop_affected: 0,
            pop_affected_pct: 0.0,
        });
        ds
    }

    #[test]
    fn untriggered_lead_time_falls_back_to_empty() {
        let maps = FloodMapSet::new(vec![(10.0, grid(5.0))]).unwrap();
        let extents = ExtentBuilder::build(&forecast_admin(false, 10.0), &boundaries(), &maps).unwrap();
        assert_eq!(extents.get(2), &extents.empty);
    }

    #[test]
    fn triggered_lead_time_merges_masked_raster() {
        let maps = FloodMapSet::new(vec![(10.0, grid(5.0))]).unwrap();
        let extents = ExtentBuilder::build(&forecast_admin(true, 10.0), &boundaries(), &maps).unwrap();
        assert_eq!(extents.get(2).get(0, 0), 5.0);
    }

    #[test]
    fn missing_return_period_falls_back_to_smallest_available() {
        let maps = FloodMapSet::new(vec![(20.0, grid(3.0)), (50.0, grid(9.0))]).unwrap();
        assert_eq!(maps.for_return_period(50.0).get(0, 0), 9.0);
        assert_eq!(maps.for_return_period(999.0).get(0, 0), 3.0);
    }
}
