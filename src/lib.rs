//! Live race-strategy advisor: Monte Carlo projection of a chaos event,
//! a pit wall call, and a radio message broadcast to every connected client.

pub mod config;
pub mod desk;
pub mod predictor;
pub mod radio;
pub mod server;
pub mod session;
pub mod simulator;
pub mod strategy;
pub mod types;

pub use desk::PitWall;
pub use predictor::{PacePredictor, PredictorError};
pub use session::Session;
pub use simulator::SimulationEngine;
pub use types::{BroadcastMessage, ChaosEvent, Compound, MathResults, RaceState, SimulationResult};
