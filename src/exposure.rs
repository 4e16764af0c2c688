//! ExposureCalc: per-admin population-affected numbers from the flood
//! extents (spec §4.5).

use std::collections::HashMap;

use crate::error::PipelineError;
use crate::extent::ExtentSet;
use crate::geometry::AdminBoundarySet;
use crate::model::{ForecastAdmin, ForecastAdminDataset};
use crate::raster::Grid;

pub struct ExposureCalc;

impl ExposureCalc {
    /// Fills in `pop_affected`/`pop_affected_pct` on every triggered unit in
    /// `forecast_admin`, in place. `boundaries_by_level` must cover every
    /// admin level present among triggered units.
    pub fn apply(
        forecast_admin: &mut ForecastAdminDataset,
        extents: &ExtentSet,
        population: &Grid,
        boundaries_by_level: &HashMap<u8, AdminBoundarySet>,
        minimum_flood_depth: f64,
    ) -> Result<(), PipelineError> {
        // Resampled onto each lead time's extent grid once, then reused for
        // both the affected-population sum and the total-population
        // denominator so the two are computed off the same pixel grid.
        let mut by_lead_time: HashMap<u8, (Grid, Grid)> = HashMap::new();

        let units: Vec<ForecastAdmin> = forecast_admin.units().to_vec();
        for mut unit in units {
            if !unit.triggered {
                continue;
            }

            if !by_lead_time.contains_key(&unit.lead_time) {
                let extent = extents.get(unit.lead_time);
                let affected = extent.mask_population_where_ge(population, minimum_flood_depth);
                let aligned_population = population.resampled_to(extent);
                by_lead_time.insert(unit.lead_time, (affected, aligned_population));
            }
            let (affected, aligned_population) = &by_lead_time[&unit.lead_time];

            let boundaries = boundaries_by_level
                .get(&unit.adm_level)
                .ok_or(PipelineError::AdminLevelMissing(unit.adm_level))?;
            let polygon = boundaries.get(&unit.pcode)?;

            let pop_affected = affected.zonal_sum_floor(polygon);
            let total_pop = aligned_population.zonal_sum_floor(polygon);

            unit.pop_affected = pop_affected.round() as u64;
            unit.pop_affected_pct = if total_pop > 0.0 { 100.0 * pop_affected / total_pop } else { 0.0 };
            forecast_admin.upsert(unit);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extent::ExtentBuilder;
    use crate::extent::FloodMapSet;
    use crate::model::{AdminDataset, Forecast};
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

    fn boundaries() -> HashMap<u8, AdminBoundarySet> {
        let fc = r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{"ADM1_PCODE":"PH1"},"geometry":{"type":"Polygon","coordinates":[[[0.0,0.0],[0.0,2.0],[2.0,2.0],[2.0,0.0],[0.0,0.0]]]}}]}"#;
        HashMap::from([(1, AdminBoundarySet::from_geojson(1, fc.as_bytes()).unwrap())])
    }

    #[test]
    fn exposure_sums_population_where_flood_depth_met() {
        let maps = FloodMapSet::new(vec![(10.0, grid(1.0))]).unwrap();
        let boundaries = boundaries();

        let mut forecast_admin: ForecastAdminDataset = AdminDataset::new("PHL", Utc::now(), vec![1]);
        forecast_admin.upsert(ForecastAdmin {
            adm_level: 1,
            pcode: "PH1".into(),
            lead_time: 2,
            forecasts: vec![Forecast { return_period: 10.0, likelihood: 1.0 }],
            triggered: true,
            return_period: 10.0,
            alert_class: crate::model::AlertClass::Med,
            pop_affected: 0,
            pop_affected_pct: 0.0,
        });

        let extents = ExtentBuilder::build(&forecast_admin, &boundaries[&1], &maps).unwrap();
        let population = grid(100.0);

        ExposureCalc::apply(&mut forecast_admin, &extents, &population, &boundaries, 0.5).unwrap();

        let unit = forecast_admin.get("PH1", Some(2)).unwrap();
        assert_eq!(unit.pop_affected, 400);
        assert_eq!(unit.pop_affected_pct, 100.0);
    }

    #[test]
    fn untriggered_units_are_left_at_zero() {
        let maps = FloodMapSet::new(vec![(10.0, grid(0.0))]).unwrap();
        let boundaries = boundaries();
        let mut forecast_admin: ForecastAdminDataset = AdminDataset::new("PHL", Utc::now(), vec![1]);
        forecast_admin.upsert(ForecastAdmin {
            adm_level: 1,
            pcode: "PH1".into(),
            lead_time: 2,
            forecasts: vec![],
            triggered: false,
            return_period: 0.0,
            alert_class: crate::model::AlertClass::No,
            pop_affected: 0,
            pop_affected_pct: 0.0,
        });
        let extents = ExtentBuilder::build(&forecast_admin, &boundaries[&1], &maps).unwrap();
        let population = grid(100.0);
        ExposureCalc::apply(&mut forecast_admin, &extents, &population, &boundaries, 0.5).unwrap();
        assert_eq!(forecast_admin.get("PH1", Some(2)).unwrap().pop_affected, 0);
    }
}
