use crate::world::Driver;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters of the branch started by a `ycf`/`ncf` override token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterfactualConfig {
    pub seed: u64,
    pub ai_scaler: Option<f64>,
    pub human_scaler: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub name: String,
    pub seed: u64,
    /// Ticks a jammed traffic cell holds the vehicle.
    pub traffic_delay: u32,
    pub human_dwell: u32,
    /// Field-of-vision radius, 1 gives a 3x3 window.
    pub radius: u32,
    /// `None` drives optimally, `Some(t)` samples a softmax at temperature `t`.
    pub ai_scaler: Option<f64>,
    pub human_scaler: Option<f64>,
    pub ai_switching: f64,
    pub human_switching: f64,
    /// Temperature of the human's mental simulations and of the handoff softmax.
    pub sim_scaler: f64,
    pub rollouts: usize,
    /// Fixed episode horizon. Without it handoffs are scored on mean completion time.
    pub horizon: Option<u32>,
    pub rollout_max_ticks: u32,
    pub max_ticks: Option<u32>,
    pub initial_driver: Driver,
    pub counterfactual: Option<CounterfactualConfig>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            name: "default_episode".to_string(),
            seed: 42,
            traffic_delay: 10,
            human_dwell: 0,
            radius: 1,
            ai_scaler: None,
            human_scaler: None,
            ai_switching: 0.2,
            human_switching: 0.0,
            sim_scaler: 1.0,
            rollouts: 300,
            horizon: None,
            rollout_max_ticks: 500,
            max_ticks: None,
            initial_driver: Driver::Ai,
            counterfactual: None,
        }
    }
}

impl SimConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_scalers(mut self, ai: Option<f64>, human: Option<f64>) -> Self {
        self.ai_scaler = ai;
        self.human_scaler = human;
        self
    }

    pub fn with_switching(mut self, ai: f64, human: f64) -> Self {
        self.ai_switching = ai;
        self.human_switching = human;
        self
    }

    pub fn with_rollouts(mut self, rollouts: usize) -> Self {
        self.rollouts = rollouts;
        self
    }

    pub fn with_horizon(mut self, horizon: Option<u32>) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_max_ticks(mut self, max_ticks: Option<u32>) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    pub fn with_initial_driver(mut self, driver: Driver) -> Self {
        self.initial_driver = driver;
        self
    }

    pub fn with_counterfactual(mut self, seed: u64, ai_scaler: Option<f64>, human_scaler: Option<f64>) -> Self {
        self.counterfactual = Some(CounterfactualConfig {
            seed,
            ai_scaler,
            human_scaler,
        });
        self
    }
}
