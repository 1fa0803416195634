use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ---------- Tyre compounds ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compound {
    Soft,
    Medium,
    Hard,
    Intermediate,
    Wet,
}

impl Compound {
    pub const ALL: [Compound; 5] = [
        Compound::Soft,
        Compound::Medium,
        Compound::Hard,
        Compound::Intermediate,
        Compound::Wet,
    ];

    /// Case-insensitive parse. Accepts the short pit-board names (`I`, `INTER`, `W`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SOFT" | "S" => Some(Compound::Soft),
            "MEDIUM" | "M" => Some(Compound::Medium),
            "HARD" | "H" => Some(Compound::Hard),
            "INTERMEDIATE" | "INTER" | "I" => Some(Compound::Intermediate),
            "WET" | "W" => Some(Compound::Wet),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Compound::Soft => "SOFT",
            Compound::Medium => "MEDIUM",
            Compound::Hard => "HARD",
            Compound::Intermediate => "INTERMEDIATE",
            Compound::Wet => "WET",
        }
    }

    /// Slicks. Intermediates and full wets are the wet-weather compounds.
    pub fn is_dry(self) -> bool {
        matches!(self, Compound::Soft | Compound::Medium | Compound::Hard)
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------- Chaos events ----------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChaosEvent {
    None,
    Rain,
    MinorCrash,
    MajorCrash,
    TyreFailure,
    TyreDeg,
    Heatwave,
    Traffic,
    Penalty5s,
    StrategyUpdate,
    /// Unrecognised tag, simulated as a nominal lap.
    Other(String),
}

impl ChaosEvent {
    pub fn parse(raw: &str) -> Self {
        let tag = raw.trim().to_ascii_lowercase();
        match tag.as_str() {
            "" | "none" => ChaosEvent::None,
            "rain" => ChaosEvent::Rain,
            "minor_crash" => ChaosEvent::MinorCrash,
            "major_crash" => ChaosEvent::MajorCrash,
            "tyre_failure" => ChaosEvent::TyreFailure,
            "tyre_deg" => ChaosEvent::TyreDeg,
            "heatwave" => ChaosEvent::Heatwave,
            "traffic" => ChaosEvent::Traffic,
            "penalty_5s" => ChaosEvent::Penalty5s,
            "strategy_update" => ChaosEvent::StrategyUpdate,
            _ => ChaosEvent::Other(tag),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ChaosEvent::None => "none",
            ChaosEvent::Rain => "rain",
            ChaosEvent::MinorCrash => "minor_crash",
            ChaosEvent::MajorCrash => "major_crash",
            ChaosEvent::TyreFailure => "tyre_failure",
            ChaosEvent::TyreDeg => "tyre_deg",
            ChaosEvent::Heatwave => "heatwave",
            ChaosEvent::Traffic => "traffic",
            ChaosEvent::Penalty5s => "penalty_5s",
            ChaosEvent::StrategyUpdate => "strategy_update",
            ChaosEvent::Other(tag) => tag,
        }
    }

    /// Routine updates get a calm radio persona; everything else is urgent.
    pub fn is_routine(&self) -> bool {
        matches!(self, ChaosEvent::StrategyUpdate)
    }
}

impl fmt::Display for ChaosEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------- Race state ----------

#[derive(Debug, Clone, PartialEq)]
pub struct RaceState {
    pub tire_age: u32,
    pub compound: Compound,
    pub laps_left: u32,
    pub lap_number: u32,
    pub position: u32,
    pub stint: u32,
    pub fresh_tyre: bool,
    pub air_temp: f64,
    pub track_temp: f64,
    pub humidity: f64,
    pub rainfall: i64,
}

// ---------- Inbound message ----------

pub const DEFAULT_TIRE_AGE: i64 = 15;
pub const DEFAULT_COMPOUND: Compound = Compound::Medium;
pub const DEFAULT_LAPS_LEFT: i64 = 30;
pub const DEFAULT_POSITION: i64 = 10;
pub const DEFAULT_STINT: i64 = 1;
pub const DEFAULT_AIR_TEMP: f64 = 25.0;
pub const DEFAULT_TRACK_TEMP: f64 = 35.0;
pub const DEFAULT_HUMIDITY: f64 = 50.0;
pub const DEFAULT_RAINFALL: i64 = 0;

/// One chaos event as received from a client, with every missing or
/// mistyped field already replaced by its default.
#[derive(Debug, Clone, PartialEq)]
pub struct ChaosRequest {
    /// Lowercased tag as sent, echoed back in the broadcast.
    pub event_tag: String,
    pub event: ChaosEvent,
    pub current_tire_age: i64,
    pub compound: Compound,
    pub laps_left: i64,
    pub position: i64,
    pub stint: i64,
    pub fresh_tyre: bool,
    pub air_temp: f64,
    pub track_temp: f64,
    pub humidity: f64,
    pub rainfall: i64,
}

impl ChaosRequest {
    /// Never fails: non-JSON text becomes `{event: <raw text>}`.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Self::from_map(&map),
            Ok(Value::String(s)) => Self::from_event(&s),
            _ => Self::from_event(raw),
        }
    }

    fn from_event(event: &str) -> Self {
        Self::from_map(&Map::from_iter([(
            "event".to_string(),
            Value::String(event.to_string()),
        )]))
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        let event_tag = map
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        let compound = match map.get("compound").and_then(Value::as_str) {
            Some(raw) => Compound::parse(raw).unwrap_or_else(|| {
                tracing::warn!(compound = raw, "unknown compound, assuming {}", DEFAULT_COMPOUND);
                DEFAULT_COMPOUND
            }),
            None => DEFAULT_COMPOUND,
        };

        Self {
            event: ChaosEvent::parse(&event_tag),
            event_tag,
            current_tire_age: int_field(map, "current_tire_age", DEFAULT_TIRE_AGE),
            compound,
            laps_left: int_field(map, "laps_left", DEFAULT_LAPS_LEFT),
            position: int_field(map, "position", DEFAULT_POSITION),
            stint: int_field(map, "stint", DEFAULT_STINT),
            fresh_tyre: bool_field(map, "fresh_tyre", false),
            air_temp: float_field(map, "air_temp", DEFAULT_AIR_TEMP),
            track_temp: float_field(map, "track_temp", DEFAULT_TRACK_TEMP),
            humidity: float_field(map, "humidity", DEFAULT_HUMIDITY),
            rainfall: int_field(map, "rainfall", DEFAULT_RAINFALL),
        }
    }

    /// Clamps counters into range and derives the lap number from the
    /// circuit's race distance.
    pub fn race_state(&self, total_laps: u32) -> RaceState {
        let laps_left = clamp_u32(self.laps_left, 0);
        RaceState {
            tire_age: clamp_u32(self.current_tire_age, 0),
            compound: self.compound,
            laps_left,
            lap_number: total_laps.saturating_sub(laps_left).max(1),
            position: clamp_u32(self.position, 1),
            stint: clamp_u32(self.stint, 1),
            fresh_tyre: self.fresh_tyre,
            air_temp: self.air_temp,
            track_temp: self.track_temp,
            humidity: self.humidity,
            rainfall: self.rainfall,
        }
    }
}

fn int_field(map: &Map<String, Value>, key: &str, default: i64) -> i64 {
    match map.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(default),
        _ => default,
    }
}

fn float_field(map: &Map<String, Value>, key: &str, default: f64) -> f64 {
    map.get(key)
        .and_then(Value::as_f64)
        .filter(|f| f.is_finite())
        .unwrap_or(default)
}

fn bool_field(map: &Map<String, Value>, key: &str, default: bool) -> bool {
    match map.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => match n.as_i64() {
            Some(0) => false,
            Some(1) => true,
            _ => default,
        },
        _ => default,
    }
}

fn clamp_u32(v: i64, min: u32) -> u32 {
    v.clamp(min as i64, u32::MAX as i64) as u32
}

// ---------- Outbound ----------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub predicted_total_time: f64,
    pub win_probability: u8,
    pub recommendation: String,
    #[serde(rename = "math_baseline_lap")]
    pub baseline_lap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MathResults {
    Ok(SimulationResult),
    Error { error: String },
}

impl MathResults {
    pub fn error(msg: impl Into<String>) -> Self {
        MathResults::Error { error: msg.into() }
    }

    pub fn as_result(&self) -> Option<&SimulationResult> {
        match self {
            MathResults::Ok(r) => Some(r),
            MathResults::Error { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub event: String,
    pub math_results: MathResults,
    pub radio_call: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_takes_every_default() {
        let req = ChaosRequest::parse("{}");
        assert_eq!(req.event, ChaosEvent::None);
        assert_eq!(req.current_tire_age, 15);
        assert_eq!(req.compound, Compound::Medium);
        assert_eq!(req.laps_left, 30);
        assert_eq!(req.position, 10);
        assert_eq!(req.stint, 1);
        assert!(!req.fresh_tyre);
        assert_eq!(req.air_temp, 25.0);
        assert_eq!(req.track_temp, 35.0);
        assert_eq!(req.humidity, 50.0);
        assert_eq!(req.rainfall, 0);
    }

    #[test]
    fn raw_text_becomes_the_event() {
        let req = ChaosRequest::parse("RAIN");
        assert_eq!(req.event, ChaosEvent::Rain);
        assert_eq!(req.event_tag, "rain");

        let req = ChaosRequest::parse("alien invasion");
        assert_eq!(req.event, ChaosEvent::Other("alien invasion".into()));
    }

    #[test]
    fn mistyped_fields_fall_back_individually() {
        let req = ChaosRequest::parse(
            r#"{"event":"traffic","laps_left":"ten","current_tire_age":7.9,"compound":42,"fresh_tyre":1}"#,
        );
        assert_eq!(req.event, ChaosEvent::Traffic);
        assert_eq!(req.laps_left, 30);
        assert_eq!(req.current_tire_age, 7);
        assert_eq!(req.compound, Compound::Medium);
        assert!(req.fresh_tyre);
    }

    #[test]
    fn race_state_clamps_negative_counters() {
        let req = ChaosRequest::parse(
            r#"{"current_tire_age":-3,"laps_left":-1,"position":0,"stint":-2}"#,
        );
        let state = req.race_state(53);
        assert_eq!(state.tire_age, 0);
        assert_eq!(state.laps_left, 0);
        assert_eq!(state.position, 1);
        assert_eq!(state.stint, 1);
        assert_eq!(state.lap_number, 53);
    }

    #[test]
    fn lap_number_never_drops_below_one() {
        let req = ChaosRequest::parse(r#"{"laps_left":80}"#);
        assert_eq!(req.race_state(53).lap_number, 1);
        let req = ChaosRequest::parse(r#"{"laps_left":25}"#);
        assert_eq!(req.race_state(53).lap_number, 28);
    }

    #[test]
    fn compound_aliases() {
        assert_eq!(Compound::parse("inter"), Some(Compound::Intermediate));
        assert_eq!(Compound::parse(" w "), Some(Compound::Wet));
        assert_eq!(Compound::parse("C3"), None);
        assert!(Compound::Hard.is_dry());
        assert!(!Compound::Wet.is_dry());
    }

    #[test]
    fn error_shape_serialises_flat() {
        let v = serde_json::to_value(MathResults::error("Math engine failure")).unwrap();
        assert_eq!(v, serde_json::json!({ "error": "Math engine failure" }));
    }
}
