//! Monte Carlo race projection.
//!
//! Trials are generated one row of `laps_left` lap times at a time: the
//! degradation schedule plus the chaos event's incident time, with fresh
//! noise per lap. Each row is reduced to a race total straight away, so only
//! the `N` totals are held. Those are compared against a projected pack
//! finish.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::sync::Arc;
use thiserror::Error;

use crate::predictor::{PacePredictor, PredictorError};
use crate::strategy;
use crate::types::{ChaosEvent, MathResults, RaceState, SimulationResult};

pub const DEFAULT_TRIALS: usize = 10_000;
/// Upper bound on trials per projection; the totals buffer is `N` floats.
pub const MAX_TRIALS: usize = 1_000_000;

const LAP_NOISE_SD: f64 = 0.5;
const PACK_MARGIN_S: f64 = 2.0;

pub const ENGINE_FAILURE: &str = "Math engine failure";
pub const MODEL_NOT_LOADED: &str = "Error: Model not loaded.";

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Predictor(#[from] PredictorError),
    #[error("invalid baseline lap time {0}")]
    InvalidBaseline(f64),
    #[error("noise distribution: {0}")]
    Distribution(#[from] rand_distr::NormalError),
    #[error("non-finite trial totals")]
    NonFinite,
}

/// Raw outcome of a projection, before the strategy table is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub baseline_lap: f64,
    pub predicted_total_time: f64,
    pub win_probability: u8,
    pub pack_finish: f64,
}

#[derive(Clone)]
pub struct SimulationEngine {
    predictor: Arc<dyn PacePredictor>,
    trials: usize,
    seed: Option<u64>,
}

impl SimulationEngine {
    pub fn new(predictor: Arc<dyn PacePredictor>) -> Self {
        Self {
            predictor,
            trials: DEFAULT_TRIALS,
            seed: None,
        }
    }

    /// Clamped to `1..=MAX_TRIALS`.
    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials.clamp(1, MAX_TRIALS);
        self
    }

    /// Every call reseeds from `seed`, so identical inputs give identical
    /// results. Without a seed each call draws from OS entropy.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn trials(&self) -> usize {
        self.trials
    }

    pub fn predictor(&self) -> &Arc<dyn PacePredictor> {
        &self.predictor
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    pub fn project(&self, state: &RaceState, event: &ChaosEvent) -> Result<Projection, SimError> {
        let baseline_lap = self.predictor.predict(state)?;
        if !baseline_lap.is_finite() || baseline_lap <= 0.0 {
            return Err(SimError::InvalidBaseline(baseline_lap));
        }

        let laps = state.laps_left as usize;
        let n = self.trials;

        // 1. Degradation schedule plus incident time, shared by every trial
        let nominal: Vec<f64> = lap_schedule(baseline_lap, laps, event)
            .into_iter()
            .zip(perturbation(event, laps))
            .map(|(lap, incident)| lap + incident)
            .collect();

        // 2. One row per trial, noise drawn lap by lap and summed as it goes
        let noise = Normal::new(0.0, LAP_NOISE_SD)?;
        let mut rng = self.rng();
        let flat = total_penalty(event);
        let totals: Vec<f64> = (0..n)
            .map(|_| {
                let row: f64 = nominal.iter().map(|lap| lap + noise.sample(&mut rng)).sum();
                row + flat
            })
            .collect();
        if totals.iter().any(|t| !t.is_finite()) {
            return Err(SimError::NonFinite);
        }

        // 3. Against the pack
        let pack_finish = baseline_lap * laps as f64 + PACK_MARGIN_S;
        let wins = totals.iter().filter(|&&t| t < pack_finish).count();
        let win_probability = (wins as u64 * 100 / n as u64).min(100) as u8;

        let mean_total = totals.iter().sum::<f64>() / n as f64;

        Ok(Projection {
            baseline_lap,
            predicted_total_time: round2(mean_total).max(0.0),
            win_probability,
            pack_finish,
        })
    }

    /// Full result for the broadcast: projection plus the strategy call.
    /// Never fails; failures come back as the error shape.
    pub fn simulate(&self, state: &RaceState, event: &ChaosEvent) -> MathResults {
        match self.project(state, event) {
            Ok(p) => {
                let advice = strategy::advise(event, state.compound, p.win_probability);
                MathResults::Ok(SimulationResult {
                    predicted_total_time: p.predicted_total_time,
                    win_probability: advice.win_probability,
                    recommendation: advice.recommendation,
                    baseline_lap: round2(p.baseline_lap),
                })
            }
            Err(SimError::Predictor(PredictorError::ModelUnavailable(reason))) => {
                tracing::warn!(%reason, "simulation skipped, model not loaded");
                MathResults::Ok(SimulationResult {
                    predicted_total_time: 0.0,
                    win_probability: 0,
                    recommendation: MODEL_NOT_LOADED.to_string(),
                    baseline_lap: 0.0,
                })
            }
            Err(e) => {
                tracing::error!(event = %event, "simulator error: {}", e);
                MathResults::error(ENGINE_FAILURE)
            }
        }
    }
}

/// Tyre wear per lap, in seconds.
pub fn deg_rate(event: &ChaosEvent) -> f64 {
    match event {
        ChaosEvent::TyreDeg => 0.25,
        ChaosEvent::Heatwave => 0.20,
        _ => 0.10,
    }
}

/// Nominal lap times for the remaining laps under `event`, before noise.
pub fn lap_schedule(baseline_lap: f64, laps: usize, event: &ChaosEvent) -> Vec<f64> {
    let rate = deg_rate(event);
    let traffic = if matches!(event, ChaosEvent::Traffic) { 2.5 } else { 0.0 };
    (0..laps)
        .map(|i| baseline_lap + i as f64 * rate + traffic)
        .collect()
}

/// Seconds added to each lap by the incident itself.
pub fn perturbation(event: &ChaosEvent, laps: usize) -> Vec<f64> {
    let mut out = vec![0.0; laps];
    match event {
        ChaosEvent::Rain => out.iter_mut().for_each(|l| *l += 15.0),
        ChaosEvent::MinorCrash => out.iter_mut().take(2).for_each(|l| *l += 30.0),
        ChaosEvent::MajorCrash => out.iter_mut().take(4).for_each(|l| *l += 40.0),
        ChaosEvent::TyreFailure => {
            if let Some(first) = out.first_mut() {
                *first += 80.0;
            }
        }
        _ => {}
    }
    out
}

/// Flat time added to the race total after summation.
pub fn total_penalty(event: &ChaosEvent) -> f64 {
    match event {
        ChaosEvent::Penalty5s => 5.0,
        _ => 0.0,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
