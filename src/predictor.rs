use anyhow::{bail, ensure, Context, Result};
use serde::Deserialize;
use std::{collections::HashMap, fs, path::Path, sync::Arc};
use thiserror::Error;

use crate::types::RaceState;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PredictorError {
    #[error("pace model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("pace model produced a non-finite lap time")]
    NonFinite,
}

/// Baseline lap time for a race state, in seconds. Implementations must be
/// deterministic for identical state.
pub trait PacePredictor: Send + Sync {
    fn predict(&self, state: &RaceState) -> Result<f64, PredictorError>;

    /// Race distance used to derive the current lap from `laps_left`.
    fn total_laps(&self) -> u32;
}

// ---------- Artifact format ----------

#[derive(Deserialize, Debug, Clone)]
pub struct CircuitJson {
    pub name: String,
    pub track_km: f64,
    pub corners: u32,
    pub total_laps: u32,
}

#[derive(Deserialize, Debug, Clone)]
struct BasePaceJson {
    degree: u32,
    intercept: f64,
    coefficients: Vec<f64>,
}

#[derive(Deserialize, Debug, Clone)]
struct ResidualJson {
    #[serde(default)]
    intercept: f64,
    feat_list: Vec<String>,
    weights: Vec<f64>,
    #[serde(default)]
    compound_offsets: HashMap<String, f64>,
}

#[derive(Deserialize, Debug, Clone)]
struct ArtifactJson {
    circuit: CircuitJson,
    base_pace: BasePaceJson,
    residual: ResidualJson,
}

// ---------- Two-stage model ----------

/// Stage 1 estimates the circuit's base pace from its layout; stage 2 adds a
/// linear residual for the current race state.
#[derive(Debug, Clone)]
pub struct PaceModel {
    pub circuit: CircuitJson,
    est_base_pace: f64,
    residual: ResidualJson,
}

impl PaceModel {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let txt = fs::read_to_string(path)
            .with_context(|| format!("failed to read pace model at {}", path.display()))?;
        Self::from_json(&txt).with_context(|| format!("invalid pace model {}", path.display()))
    }

    pub fn from_json(txt: &str) -> Result<Self> {
        let art: ArtifactJson = serde_json::from_str(txt).context("failed to parse artifact json")?;

        ensure!(art.circuit.total_laps >= 1, "circuit.total_laps must be >= 1");
        ensure!(
            art.circuit.track_km.is_finite() && art.circuit.track_km > 0.0,
            "circuit.track_km must be positive"
        );

        // Term count is checked before anything is expanded.
        let degree = art.base_pace.degree;
        let got = art.base_pace.coefficients.len();
        match poly_term_count(degree) {
            Some(expected) if expected == got => {}
            Some(expected) => bail!(
                "base_pace coefficient count mismatch: got {}, expected {} for degree {}",
                got,
                expected,
                degree
            ),
            None => bail!("base_pace degree {} is out of range", degree),
        }
        let terms = poly_terms(art.circuit.track_km, art.circuit.corners as f64, degree);
        if art.residual.weights.len() != art.residual.feat_list.len() {
            bail!(
                "residual weight count mismatch: got {}, expected {}",
                art.residual.weights.len(),
                art.residual.feat_list.len()
            );
        }
        let all_finite = art.base_pace.intercept.is_finite()
            && art.residual.intercept.is_finite()
            && art.base_pace.coefficients.iter().all(|c| c.is_finite())
            && art.residual.weights.iter().all(|w| w.is_finite())
            && art.residual.compound_offsets.values().all(|o| o.is_finite());
        ensure!(all_finite, "artifact contains non-finite numbers");

        let est_base_pace = art.base_pace.intercept
            + dot(&terms, &art.base_pace.coefficients);
        ensure!(est_base_pace.is_finite(), "estimated base pace is not finite");

        Ok(Self {
            circuit: art.circuit,
            est_base_pace,
            residual: art.residual,
        })
    }

    pub fn est_base_pace(&self) -> f64 {
        self.est_base_pace
    }

    pub fn feat_list(&self) -> &[String] {
        &self.residual.feat_list
    }

    fn features(&self, state: &RaceState) -> HashMap<&'static str, f64> {
        let total = self.circuit.total_laps as f64;
        HashMap::from([
            ("EstBasePace", self.est_base_pace),
            ("FreshTyre", if state.fresh_tyre { 1.0 } else { 0.0 }),
            ("FuelLoad", 1.0 - state.lap_number as f64 / total),
            ("LapNumber", state.lap_number as f64),
            ("Position", state.position as f64),
            ("Stint", state.stint as f64),
            ("TyreLife", state.tire_age as f64),
            ("AirTemp", state.air_temp),
            ("TrackTemp", state.track_temp),
            ("Humidity", state.humidity),
            ("Rainfall", state.rainfall as f64),
        ])
    }
}

impl PacePredictor for PaceModel {
    fn predict(&self, state: &RaceState) -> Result<f64, PredictorError> {
        let features = self.features(state);
        let ordered = order_features(&features, &self.residual.feat_list);

        if std::env::var("LOG_PRED").ok().as_deref() == Some("1") {
            let sample: Vec<String> = self
                .residual
                .feat_list
                .iter()
                .zip(&ordered)
                .take(6)
                .map(|(name, v)| format!("{}={:.3}", name, v))
                .collect();
            tracing::debug!(
                compound = %state.compound,
                in_dim = ordered.len(),
                "predict sample=[{}]",
                sample.join(", ")
            );
        }

        let residual = self.residual.intercept
            + dot(&ordered, &self.residual.weights)
            + self
                .residual
                .compound_offsets
                .get(state.compound.as_str())
                .copied()
                .unwrap_or(0.0);

        let lap = self.est_base_pace + residual;
        if lap.is_finite() {
            Ok(lap)
        } else {
            Err(PredictorError::NonFinite)
        }
    }

    fn total_laps(&self) -> u32 {
        self.circuit.total_laps
    }
}

/// Missing names contribute zero so artifacts can carry features the live
/// feed does not provide.
fn order_features(map: &HashMap<&'static str, f64>, feat_list: &[String]) -> Vec<f64> {
    feat_list
        .iter()
        .map(|k| map.get(k.as_str()).copied().unwrap_or(0.0))
        .collect()
}

/// Number of terms `poly_terms` yields: `(d + 1)(d + 2) / 2 - 1`.
fn poly_term_count(degree: u32) -> Option<usize> {
    let d = u64::from(degree);
    let n = (d + 1).checked_mul(d + 2)? / 2 - 1;
    usize::try_from(n).ok()
}

/// Polynomial expansion of `[x, y]` without the bias column, graded by degree:
/// `x, y, x², xy, y², ...`.
fn poly_terms(x: f64, y: f64, degree: u32) -> Vec<f64> {
    let mut out = Vec::new();
    for d in 1..=degree as i32 {
        for k in 0..=d {
            out.push(x.powi(d - k) * y.powi(k));
        }
    }
    out
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

// ---------- Stubs ----------

/// Constant lap time. Used in tests and as a stand-in predictor.
#[derive(Debug, Clone, Copy)]
pub struct FixedPace {
    pub lap_seconds: f64,
    pub total_laps: u32,
}

impl FixedPace {
    pub fn new(lap_seconds: f64) -> Self {
        Self { lap_seconds, total_laps: MONZA_TOTAL_LAPS }
    }
}

impl PacePredictor for FixedPace {
    fn predict(&self, _state: &RaceState) -> Result<f64, PredictorError> {
        if self.lap_seconds.is_finite() {
            Ok(self.lap_seconds)
        } else {
            Err(PredictorError::NonFinite)
        }
    }

    fn total_laps(&self) -> u32 {
        self.total_laps
    }
}

/// Stands in for an artifact that failed to load. Every prediction fails.
#[derive(Debug, Clone)]
pub struct UnavailablePredictor {
    reason: String,
}

impl UnavailablePredictor {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl PacePredictor for UnavailablePredictor {
    fn predict(&self, _state: &RaceState) -> Result<f64, PredictorError> {
        Err(PredictorError::ModelUnavailable(self.reason.clone()))
    }

    fn total_laps(&self) -> u32 {
        MONZA_TOTAL_LAPS
    }
}

pub const MONZA_TOTAL_LAPS: u32 = 53;

/// Loads the artifact, degrading to [`UnavailablePredictor`] so the server
/// can still start and report the failure to clients.
pub fn load_predictor(path: impl AsRef<Path>) -> Arc<dyn PacePredictor> {
    match PaceModel::load(path.as_ref()) {
        Ok(model) => {
            tracing::info!(
                circuit = %model.circuit.name,
                est_base_pace = model.est_base_pace(),
                feats = model.feat_list().len(),
                "loaded pace model"
            );
            Arc::new(model)
        }
        Err(e) => {
            tracing::warn!("pace model unavailable: {:#}", e);
            Arc::new(UnavailablePredictor::new(format!("{:#}", e)))
        }
    }
}
