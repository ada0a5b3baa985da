pub mod filter;

pub use filter::BeliefFilter;

use crate::models::Observation;
use crate::planner::{HazardKey, JamLevel};
use crate::world::{Cell, WorldState};
use serde::{Deserialize, Serialize};

/// Probabilities are kept at this many decimals so they can key plan caches.
pub const PRECISION: i32 = 5;

pub fn round_probability(p: f64) -> f64 {
    let scale = 10f64.powi(PRECISION);
    (p * scale).round() / scale
}

/// One agent's view of the hazards. Never mutated in place: every update
/// produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Belief {
    vehicle: Cell,
    goal: Cell,
    closure: Option<Cell>,
    accident: Option<Cell>,
    traffic: Vec<f64>,
    idle: u32,
}

impl Belief {
    pub fn new(
        vehicle: Cell,
        goal: Cell,
        closure: Option<Cell>,
        accident: Option<Cell>,
        traffic: Vec<f64>,
        idle: u32,
    ) -> Self {
        Self {
            vehicle,
            goal,
            closure,
            accident,
            traffic: traffic.into_iter().map(round_probability).collect(),
            idle,
        }
    }

    /// Sensor view: exact traffic, no knowledge of closures or accidents.
    pub fn initial_ai(state: &WorldState) -> Self {
        let traffic = state.traffic.iter().map(|t| if t.jammed { 1.0 } else { 0.0 }).collect();
        Self::new(state.vehicle, state.goal, None, None, traffic, state.idle)
    }

    /// Local knowledge: the closure is known, every traffic cell is a coin flip.
    pub fn initial_human(state: &WorldState) -> Self {
        let traffic = vec![0.5; state.traffic.len()];
        Self::new(state.vehicle, state.goal, state.closure, None, traffic, state.idle)
    }

    pub fn vehicle(&self) -> Cell {
        self.vehicle
    }

    pub fn goal(&self) -> Cell {
        self.goal
    }

    pub fn closure(&self) -> Option<Cell> {
        self.closure
    }

    pub fn accident(&self) -> Option<Cell> {
        self.accident
    }

    pub fn traffic(&self) -> &[f64] {
        &self.traffic
    }

    /// Folds in the next state's position and an observation. Revealed hazards stay
    /// revealed and observed traffic takes its true value.
    pub fn revise(&self, state: &WorldState, observation: &Observation) -> Belief {
        let traffic = self
            .traffic
            .iter()
            .zip(&observation.traffic)
            .map(|(&p, seen)| match seen {
                Some(true) => 1.0,
                Some(false) => 0.0,
                None => p,
            })
            .collect();

        Belief {
            vehicle: state.vehicle,
            goal: state.goal,
            closure: observation.closure.or(self.closure),
            accident: observation.accident.or(self.accident),
            traffic,
            idle: state.idle,
        }
    }

    pub fn with_traffic(&self, traffic: Vec<f64>) -> Belief {
        Belief {
            traffic: traffic.into_iter().map(round_probability).collect(),
            ..self.clone()
        }
    }

    /// Indices of traffic cells whose state is not known for sure.
    pub fn unknown_traffic(&self) -> Vec<usize> {
        self.traffic
            .iter()
            .enumerate()
            .filter(|&(_, &p)| p != 0.0 && p != 1.0)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn hazard_key(&self) -> HazardKey {
        HazardKey::new(
            self.closure,
            self.accident,
            self.traffic.iter().map(|&p| JamLevel::from_probability(p)),
        )
    }

    pub fn same_hazards(&self, other: &Belief) -> bool {
        self.hazard_key() == other.hazard_key()
    }
}
