use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path, str::FromStr, time::Duration};

use crate::radio::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};
use crate::simulator::DEFAULT_TRIALS;

const MIN_RADIO_BUDGET_MS: u64 = 1500;
const MAX_RADIO_BUDGET_MS: u64 = 2000;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub model_path: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub radio_budget_ms: u64,
    pub num_sims: usize,
    pub sim_seed: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            model_path: "models/pace_model.json".to_string(),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            radio_budget_ms: MIN_RADIO_BUDGET_MS,
            num_sims: DEFAULT_TRIALS,
            sim_seed: None,
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("config file not found: {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("invalid config JSON in {}", path.display()))
    }

    /// File named by `CONFIG_PATH` (if set), then environment overrides.
    pub fn from_env() -> Result<Self> {
        let base = match std::env::var("CONFIG_PATH") {
            Ok(p) => Self::load(&p)?,
            Err(_) => Self::default(),
        };
        Ok(base.with_overrides(|k| std::env::var(k).ok()))
    }

    pub fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = var("BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = var("MODEL_PATH") {
            self.model_path = v;
        }
        if let Some(v) = var("GEMINI_API_KEY") {
            self.gemini_api_key = Some(v);
        }
        if let Some(v) = var("GEMINI_MODEL") {
            self.gemini_model = v;
        }
        if let Some(v) = var("GEMINI_BASE_URL") {
            self.gemini_base_url = v;
        }
        if let Some(v) = parsed(&var, "RADIO_BUDGET_MS") {
            self.radio_budget_ms = v;
        }
        if let Some(v) = parsed(&var, "NUM_SIMS") {
            self.num_sims = v;
        }
        if let Some(v) = parsed(&var, "SIM_SEED") {
            self.sim_seed = Some(v);
        }
        // Empty key means "not configured", same as unset.
        if self.gemini_api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            self.gemini_api_key = None;
        }
        self
    }

    pub fn radio_budget(&self) -> Duration {
        Duration::from_millis(
            self.radio_budget_ms
                .clamp(MIN_RADIO_BUDGET_MS, MAX_RADIO_BUDGET_MS),
        )
    }
}

fn parsed<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring malformed setting");
            None
        }
    }
}
