pub mod rollout;

pub use rollout::{Rollout, RolloutOutcome};

use crate::belief::Belief;
use crate::error::{Result, SimError};
use crate::simulation::{SimConfig, SimContext};
use crate::world::{Driver, WorldState};
use rand::Rng;
use rand_distr::{Bernoulli, Distribution};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How good each control assignment looks from the human's point of view.
/// Higher is better: negative mean completion time, or the fraction of rollouts
/// that finish inside the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HandoffScores {
    pub ai: f64,
    pub human: f64,
}

/// One resolved propose-switch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrationRecord {
    pub tick: u32,
    /// Controller when the switch was proposed.
    pub driver: Driver,
    pub scores: HandoffScores,
    /// Softmax probability of handing control to (or keeping it with) the AI.
    pub p_ai: f64,
    pub sampled: Driver,
    pub resolved: Driver,
    /// Override token that decided the outcome, if any.
    pub token: Option<String>,
    pub counterfactual: bool,
}

impl ArbitrationRecord {
    pub fn switched(&self) -> bool {
        self.resolved != self.driver
    }
}

/// Scores both control assignments with Monte-Carlo rollouts and samples the
/// next controller from a softmax over the scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arbitrator {
    rollouts: usize,
    horizon: Option<u32>,
    sim_scaler: f64,
    rollout_max_ticks: u32,
}

impl Arbitrator {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            rollouts: config.rollouts,
            horizon: config.horizon,
            sim_scaler: config.sim_scaler,
            rollout_max_ticks: config.rollout_max_ticks,
        }
    }

    pub fn rollouts(&self) -> usize {
        self.rollouts
    }

    /// Runs `rollouts` futures per assignment from `state`. Traffic draws and
    /// rollout seeds come from `rng` in a fixed order before any rollout runs, so
    /// the result does not depend on how rayon schedules them.
    pub fn score<R: Rng + ?Sized>(
        &self,
        ctx: &SimContext,
        state: &WorldState,
        ai: &Belief,
        human: &Belief,
        tick: u32,
        rng: &mut R,
    ) -> Result<HandoffScores> {
        let coins = human
            .traffic()
            .iter()
            .map(|&p| Bernoulli::new(p).map_err(|_| SimError::InvalidProbability(p)))
            .collect::<Result<Vec<_>>>()?;

        let mut plans = Vec::with_capacity(2 * self.rollouts);
        for driver in [Driver::Human, Driver::Ai] {
            for _ in 0..self.rollouts {
                let traffic: Vec<bool> = coins.iter().map(|coin| coin.sample(rng)).collect();
                let seed = rng.r#gen::<u64>();
                plans.push(Rollout::new(driver, state, ai, human, traffic, seed));
            }
        }

        let outcomes = plans
            .into_par_iter()
            .map(|rollout| {
                let driver = rollout.driver();
                rollout.run(ctx).map(|outcome| (driver, outcome))
            })
            .collect::<Result<Vec<_>>>()?;

        let unfinished = outcomes.iter().filter(|(_, o)| !o.finished()).count();
        ctx.metrics.rollouts(outcomes.len() as u64, unfinished as u64);

        let scores = HandoffScores {
            ai: self.aggregate(&outcomes, Driver::Ai, state.driver, tick),
            human: self.aggregate(&outcomes, Driver::Human, state.driver, tick),
        };
        debug!(
            "Handoff scores at tick {}: ai {:.4}, human {:.4} ({} unfinished rollouts)",
            tick, scores.ai, scores.human, unfinished
        );
        Ok(scores)
    }

    /// Rollouts under a different driver start one tick late.
    fn aggregate(&self, outcomes: &[(Driver, RolloutOutcome)], driver: Driver, current: Driver, tick: u32) -> f64 {
        let penalty = u64::from(driver != current);
        let runs = outcomes.iter().filter(|(d, _)| *d == driver).map(|(_, o)| *o);

        let count = runs.clone().count();
        if count == 0 {
            return 0.0;
        }

        match self.horizon {
            None => {
                let total: u64 = runs
                    .map(|outcome| match outcome {
                        RolloutOutcome::Finished { ticks } => u64::from(ticks) + penalty,
                        RolloutOutcome::Unfinished => u64::from(self.rollout_max_ticks) + penalty,
                    })
                    .sum();
                -(total as f64 / count as f64)
            }
            Some(horizon) => {
                let remaining = i64::from(horizon) - i64::from(tick);
                let on_time = runs
                    .filter(|outcome| match outcome {
                        RolloutOutcome::Finished { ticks } => i64::from(*ticks) + penalty as i64 <= remaining,
                        RolloutOutcome::Unfinished => false,
                    })
                    .count();
                on_time as f64 / count as f64
            }
        }
    }

    /// Probability of the AI holding control after the handoff.
    pub fn ai_probability(&self, scores: HandoffScores) -> f64 {
        let ai = self.sim_scaler * scores.ai;
        let human = self.sim_scaler * scores.human;
        let top = ai.max(human);
        let (ai, human) = ((ai - top).exp(), (human - top).exp());
        ai / (ai + human)
    }

    pub fn decide<R: Rng + ?Sized>(&self, scores: HandoffScores, rng: &mut R) -> Result<(Driver, f64)> {
        let p_ai = self.ai_probability(scores);
        let coin = Bernoulli::new(p_ai).map_err(|_| SimError::InvalidProbability(p_ai))?;
        let driver = if coin.sample(rng) { Driver::Ai } else { Driver::Human };
        Ok((driver, p_ai))
    }
}
