//! Per-country policy configuration: trigger/alert criteria, admin levels,
//! and ensemble size (spec §6 "per-country config keys").
//!
//! Follows the same shape as the reference service's station registry:
//! a raw `#[derive(Deserialize)]` struct mirrors the TOML file verbatim,
//! then a fallible conversion builds the validated domain type.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use crate::error::PipelineError;
use crate::geometry::BoundingBox;
use crate::model::AlertClass;

/// How `ForecastEngine` walks the class->criterion table (spec §4.3).
#[derive(Debug, Clone)]
pub enum ClassifyMode {
    ReturnPeriod {
        alert_on_rp: HashMap<AlertClass, f64>,
        alert_min_prob: f64,
    },
    Probability {
        alert_on_rp: f64,
        alert_on_prob: HashMap<AlertClass, f64>,
    },
    /// Disable mode reuses the return-period map's shape: the defined classes
    /// are its keys (see DESIGN.md, open question 1).
    Disable {
        defined_classes: HashMap<AlertClass, f64>,
    },
}

#[derive(Debug, Clone)]
pub struct CountryPolicy {
    pub country: String,
    /// Ascending specificity order, e.g. `[1, 2, 3]`.
    pub admin_levels: Vec<u8>,
    pub trigger_lead_time: u8,
    pub trigger_rp: f64,
    pub trigger_min_prob: f64,
    pub classify: ClassifyMode,
    pub no_ensemble_members: u32,
    pub minimum_flood_depth: f64,
    /// `Ingest`'s slicing bbox (spec §4.1 step 1). Not named in the
    /// distilled per-country config keys, so this adds `bbox` as a
    /// `[min_lon, min_lat, max_lon, max_lat]` TOML array (see DESIGN.md).
    pub bbox: BoundingBox,
}

impl CountryPolicy {
    /// The deepest (most specific) configured admin level, used by
    /// `ExtentBuilder` (spec §4.4).
    pub fn deepest_admin_level(&self) -> Option<u8> {
        self.admin_levels.iter().copied().max()
    }
}

// ---------------------------------------------------------------------------
// Raw TOML shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScalarOrMap {
    Scalar(f64),
    Map(HashMap<String, f64>),
}

#[derive(Debug, Deserialize)]
struct RawCountryPolicy {
    #[serde(rename = "admin-levels")]
    admin_levels: Vec<u8>,
    #[serde(rename = "trigger-on-lead-time")]
    trigger_on_lead_time: u8,
    #[serde(rename = "trigger-on-return-period")]
    trigger_on_return_period: f64,
    #[serde(rename = "trigger-on-minimum-probability")]
    trigger_on_minimum_probability: f64,
    #[serde(rename = "classify-alert-on")]
    classify_alert_on: String,
    #[serde(rename = "alert-on-return-period")]
    alert_on_return_period: ScalarOrMap,
    #[serde(rename = "alert-on-minimum-probability")]
    alert_on_minimum_probability: ScalarOrMap,
    no_ensemble_members: u32,
    #[serde(default)]
    minimum_flood_depth: f64,
    bbox: [f64; 4],
}

#[derive(Debug, Deserialize)]
struct RawRegistry {
    countries: HashMap<String, RawCountryPolicy>,
}

fn parse_class_map(raw: &HashMap<String, f64>) -> Result<HashMap<AlertClass, f64>, PipelineError> {
    let mut out = HashMap::with_capacity(raw.len());
    for (k, v) in raw {
        out.insert(k.parse::<AlertClass>()?, *v);
    }
    Ok(out)
}

fn build_policy(country: &str, raw: RawCountryPolicy) -> Result<CountryPolicy, PipelineError> {
    let classify = match raw.classify_alert_on.as_str() {
        "return-period" => {
            let alert_on_rp = match raw.alert_on_return_period {
                ScalarOrMap::Map(m) => parse_class_map(&m)?,
                ScalarOrMap::Scalar(_) => {
                    return Err(PipelineError::PolicyInvalid(format!(
                        "{country}: classify-alert-on=return-period requires alert-on-return-period to be a map"
                    )))
                }
            };
            let alert_min_prob = match raw.alert_on_minimum_probability {
                ScalarOrMap::Scalar(s) => s,
                ScalarOrMap::Map(_) => {
                    return Err(PipelineError::PolicyInvalid(format!(
                        "{country}: classify-alert-on=return-period requires alert-on-minimum-probability to be a scalar"
                    )))
                }
            };
            ClassifyMode::ReturnPeriod { alert_on_rp, alert_min_prob }
        }
        "probability" => {
            let alert_on_rp = match raw.alert_on_return_period {
                ScalarOrMap::Scalar(s) => s,
                ScalarOrMap::Map(_) => {
                    return Err(PipelineError::PolicyInvalid(format!(
                        "{country}: classify-alert-on=probability requires alert-on-return-period to be a scalar"
                    )))
                }
            };
            let alert_on_prob = match raw.alert_on_minimum_probability {
                ScalarOrMap::Map(m) => parse_class_map(&m)?,
                ScalarOrMap::Scalar(_) => {
                    return Err(PipelineError::PolicyInvalid(format!(
                        "{country}: classify-alert-on=probability requires alert-on-minimum-probability to be a map"
                    )))
                }
            };
            ClassifyMode::Probability { alert_on_rp, alert_on_prob }
        }
        "disable" => {
            let defined_classes = match raw.alert_on_return_period {
                ScalarOrMap::Map(m) => parse_class_map(&m)?,
                ScalarOrMap::Scalar(_) => {
                    return Err(PipelineError::PolicyInvalid(format!(
                        "{country}: classify-alert-on=disable requires alert-on-return-period to be a map of defined classes"
                    )))
                }
            };
            ClassifyMode::Disable { defined_classes }
        }
        other => {
            return Err(PipelineError::PolicyInvalid(format!(
                "{country}: unknown classify-alert-on '{other}', expected return-period/probability/disable"
            )))
        }
    };

    if raw.admin_levels.is_empty() {
        return Err(PipelineError::PolicyInvalid(format!("{country}: admin-levels must not be empty")));
    }
    if !(1..=crate::model::MAX_LEAD_TIME).contains(&raw.trigger_on_lead_time) {
        return Err(PipelineError::PolicyInvalid(format!(
            "{country}: trigger-on-lead-time must be in 1..={}",
            crate::model::MAX_LEAD_TIME
        )));
    }
    if !(0.0..=1.0).contains(&raw.trigger_on_minimum_probability) {
        return Err(PipelineError::PolicyInvalid(format!(
            "{country}: trigger-on-minimum-probability must be in [0,1]"
        )));
    }

    let [min_lon, min_lat, max_lon, max_lat] = raw.bbox;
    if min_lon > max_lon || min_lat > max_lat {
        return Err(PipelineError::PolicyInvalid(format!("{country}: bbox has min > max")));
    }

    Ok(CountryPolicy {
        country: country.to_string(),
        admin_levels: raw.admin_levels,
        trigger_lead_time: raw.trigger_on_lead_time,
        trigger_rp: raw.trigger_on_return_period,
        trigger_min_prob: raw.trigger_on_minimum_probability,
        classify,
        no_ensemble_members: raw.no_ensemble_members,
        minimum_flood_depth: raw.minimum_flood_depth,
        bbox: BoundingBox { min_lon, min_lat, max_lon, max_lat },
    })
}

/// Holds the validated policy for every configured country.
///
/// Unlike the reference `load_config`, a malformed file or a single bad
/// country entry is returned as an error rather than panicking, so that
/// loading one country's policy never prevents the others from loading.
pub struct CountryPolicyRegistry {
    policies: HashMap<String, CountryPolicy>,
}

impl CountryPolicyRegistry {
    pub fn load_str(toml_source: &str) -> Result<Self, PipelineError> {
        let raw: RawRegistry = toml::from_str(toml_source)
            .map_err(|e| PipelineError::ConfigMissing(format!("invalid country policy TOML: {e}")))?;

        let mut policies = HashMap::with_capacity(raw.countries.len());
        for (country, raw_policy) in raw.countries {
            let policy = build_policy(&country, raw_policy)?;
            policies.insert(country, policy);
        }
        Ok(Self { policies })
    }

    pub fn load_file(path: &std::path::Path) -> Result<Self, PipelineError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::ConfigMissing(format!("cannot read {}: {e}", path.display())))?;
        Self::load_str(&contents)
    }

    pub fn get(&self, country: &str) -> Result<&CountryPolicy, PipelineError> {
        self.policies
            .get(country)
            .ok_or_else(|| PipelineError::ConfigMissing(format!("no policy configured for country {country}")))
    }

    pub fn countries(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(|s| s.as_str())
    }
}

impl fmt::Debug for CountryPolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountryPolicyRegistry")
            .field("countries", &self.policies.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RETURN_PERIOD_TOML: &str = r#"
        [countries.PHL]
        admin-levels = [1, 2, 3]
        trigger-on-lead-time = 3
        trigger-on-return-period = 5.0
        trigger-on-minimum-probability = 0.5
        classify-alert-on = "return-period"
        alert-on-return-period = { min = 2.0, med = 5.0 }
        alert-on-minimum-probability = 0.5
        no_ensemble_members = 51
        bbox = [116.0, 4.0, 127.0, 21.0]
    "#;

    const PROBABILITY_TOML: &str = r#"
        [countries.UGA]
        admin-levels = [1, 2]
        trigger-on-lead-time = 4
        trigger-on-return-period = 5.0
        trigger-on-minimum-probability = 0.5
        classify-alert-on = "probability"
        alert-on-return-period = 5.0
        alert-on-minimum-probability = { min = 0.2, med = 0.5, max = 0.8 }
        no_ensemble_members = 51
        minimum_flood_depth = 0.1
        bbox = [29.0, -1.5, 35.0, 4.5]
    "#;

    #[test]
    fn loads_return_period_policy() {
        let registry = CountryPolicyRegistry::load_str(RETURN_PERIOD_TOML).unwrap();
        let policy = registry.get("PHL").unwrap();
        assert_eq!(policy.trigger_lead_time, 3);
        assert_eq!(policy.deepest_admin_level(), Some(3));
        match &policy.classify {
            ClassifyMode::ReturnPeriod { alert_on_rp, alert_min_prob } => {
                assert_eq!(alert_on_rp.get(&AlertClass::Min), Some(&2.0));
                assert_eq!(alert_on_rp.get(&AlertClass::Med), Some(&5.0));
                assert_eq!(*alert_min_prob, 0.5);
            }
            _ => panic!("expected return-period mode"),
        }
    }

    #[test]
    fn loads_probability_policy() {
        let registry = CountryPolicyRegistry::load_str(PROBABILITY_TOML).unwrap();
        let policy = registry.get("UGA").unwrap();
        assert_eq!(policy.minimum_flood_depth, 0.1);
        match &policy.classify {
            ClassifyMode::Probability { alert_on_rp, alert_on_prob } => {
                assert_eq!(*alert_on_rp, 5.0);
                assert_eq!(alert_on_prob.get(&AlertClass::Max), Some(&0.8));
            }
            _ => panic!("expected probability mode"),
        }
    }

    #[test]
    fn rejects_wrong_shape_for_mode() {
        let bad = r#"
            [countries.XXX]
            admin-levels = [1]
            trigger-on-lead-time = 1
            trigger-on-return-period = 5.0
            trigger-on-minimum-probability = 0.5
            classify-alert-on = "probability"
            alert-on-return-period = { min = 2.0 }
            alert-on-minimum-probability = 0.5
            no_ensemble_members = 10
        "#;
        assert!(CountryPolicyRegistry::load_str(bad).is_err());
    }

    #[test]
    fn unknown_country_errors() {
        let registry = CountryPolicyRegistry::load_str(RETURN_PERIOD_TOML).unwrap();
        assert!(registry.get("ZZZ").is_err());
    }

    #[test]
    fn rejects_out_of_range_lead_time() {
        let bad = r#"
            [countries.XXX]
            admin-levels = [1]
            trigger-on-lead-time = 9
            trigger-on-return-period = 5.0
            trigger-on-minimum-probability = 0.5
            classify-alert-on = "disable"
            alert-on-return-period = { max = 1.0 }
            alert-on-minimum-probability = 0.5
            no_ensemble_members = 10
        "#;
        assert!(CountryPolicyRegistry::load_str(bad).is_err());
    }
}
