//! Per-station event derivation (spec §4.3's "Event derivation", consumed
//! by `Publisher`).

use crate::model::{AlertClass, ForecastStation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Trigger,
    Alert,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Trigger => "trigger",
            EventType::Alert => "alert",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationEvent {
    pub station_code: String,
    pub event_lead_time: u8,
    pub event_type: EventType,
}

/// `forecasts` must be the station's per-lead-time forecasts in ascending
/// lead-time order (`1..=7`) for "earliest" to mean the first match.
pub fn derive_event(station_code: &str, forecasts: &[&ForecastStation], trigger_lead_time: u8) -> Option<StationEvent> {
    if let Some(f) = forecasts.iter().find(|f| f.triggered) {
        let event_type = if f.lead_time > trigger_lead_time { EventType::Alert } else { EventType::Trigger };
        return Some(StationEvent { station_code: station_code.to_string(), event_lead_time: f.lead_time, event_type });
    }
    if let Some(f) = forecasts.iter().find(|f| f.alert_class != AlertClass::No) {
        return Some(StationEvent {
            station_code: station_code.to_string(),
            event_lead_time: f.lead_time,
            event_type: EventType::Alert,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forecast(lead_time: u8, triggered: bool, alert_class: AlertClass) -> ForecastStation {
        ForecastStation {
            station_code: "S1".into(),
            lead_time,
            forecasts: vec![],
            triggered,
            return_period: 0.0,
            alert_class,
        }
    }

    #[test]
    fn earliest_triggered_lead_time_wins_as_trigger() {
        let f1 = forecast(1, false, AlertClass::No);
        let f2 = forecast(2, true, AlertClass::Med);
        let f3 = forecast(3, true, AlertClass::Max);
        let event = derive_event("S1", &[&f1, &f2, &f3], 3).unwrap();
        assert_eq!(event.event_lead_time, 2);
        assert_eq!(event.event_type, EventType::Trigger);
    }

    #[test]
    fn triggered_beyond_trigger_lead_time_downgrades_to_alert() {
        let f1 = forecast(1, false, AlertClass::No);
        let f2 = forecast(4, true, AlertClass::Med);
        let event = derive_event("S1", &[&f1, &f2], 3).unwrap();
        assert_eq!(event.event_lead_time, 4);
        assert_eq!(event.event_type, EventType::Alert);
    }

    #[test]
    fn no_trigger_falls_back_to_earliest_alert() {
        let f1 = forecast(1, false, AlertClass::No);
        let f2 = forecast(2, false, AlertClass::Min);
        let event = derive_event("S1", &[&f1, &f2], 3).unwrap();
        assert_eq!(event.event_lead_time, 2);
        assert_eq!(event.event_type, EventType::Alert);
    }

    #[test]
    fn no_trigger_no_alert_yields_no_event() {
        let f1 = forecast(1, false, AlertClass::No);
        let f2 = forecast(2, false, AlertClass::No);
        assert!(derive_event("S1", &[&f1, &f2], 3).is_none());
    }
}
