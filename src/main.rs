use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use chaos_strategist::{
    config::AppConfig,
    predictor::load_predictor,
    radio::{GeminiClient, RadioEngineer},
    server, PitWall, Session, SimulationEngine,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = AppConfig::from_env()?;

    let predictor = load_predictor(&cfg.model_path);
    let mut engine = SimulationEngine::new(predictor).with_trials(cfg.num_sims);
    if let Some(seed) = cfg.sim_seed {
        tracing::info!(seed, "simulation seeded");
        engine = engine.with_seed(seed);
    }

    let radio = match &cfg.gemini_api_key {
        Some(key) => RadioEngineer::new(
            Arc::new(GeminiClient::new(
                key.clone(),
                cfg.gemini_model.clone(),
                cfg.gemini_base_url.clone(),
            )),
            cfg.radio_budget(),
        ),
        None => {
            tracing::warn!("GEMINI_API_KEY not set; radio calls use the simulated fallback");
            RadioEngineer::offline()
        }
    };

    let listener = TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("failed to bind TCP listener at {}", cfg.bind_addr))?;
    tracing::info!(
        trials = engine.trials(),
        budget_ms = cfg.radio_budget().as_millis() as u64,
        "strategist listening on ws://{}/ws/chaos",
        cfg.bind_addr
    );

    server::serve(listener, PitWall::new(engine, radio), Session::new()).await;
    Ok(())
}
