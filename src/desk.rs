use crate::radio::RadioEngineer;
use crate::simulator::SimulationEngine;
use crate::types::{BroadcastMessage, ChaosRequest, MathResults};

/// Runs one inbound chaos event through simulation, strategy and radio.
#[derive(Clone)]
pub struct PitWall {
    engine: SimulationEngine,
    radio: RadioEngineer,
}

impl PitWall {
    pub fn new(engine: SimulationEngine, radio: RadioEngineer) -> Self {
        Self { engine, radio }
    }

    pub fn engine(&self) -> &SimulationEngine {
        &self.engine
    }

    pub async fn handle(&self, raw: &str) -> BroadcastMessage {
        let req = ChaosRequest::parse(raw);
        tracing::info!(event = %req.event_tag, "received chaos event");

        let state = req.race_state(self.engine.predictor().total_laps());
        let math_results = self.engine.simulate(&state, &req.event);
        if let MathResults::Ok(r) = &math_results {
            tracing::debug!(
                event = %req.event,
                win_probability = r.win_probability,
                predicted_total_time = r.predicted_total_time,
                "simulation done"
            );
        }

        let radio_call = self.radio.radio_call(&math_results, &req.event).await;

        BroadcastMessage {
            event: req.event_tag,
            math_results,
            radio_call,
        }
    }
}
