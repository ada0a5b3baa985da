use crate::arbitration::ArbitrationRecord;
use crate::world::{Action, Cell, Direction, Driver, GridMap, TrafficCell};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeOutcome {
    GoalReached,
    /// The controller had no move left; the log stops at the last feasible tick.
    NoFeasiblePath,
    /// The tick cap was hit first.
    Truncated,
}

/// Static description of the world the episode ran in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapHeader {
    /// Row-major, 1 for walls and 0 for road.
    pub walls: Vec<Vec<u8>>,
    pub start: Cell,
    pub goal: Cell,
    pub closure: Option<Cell>,
    pub accident: Option<Cell>,
    pub traffic: Vec<TrafficCell>,
}

impl MapHeader {
    pub fn new(map: &GridMap) -> Self {
        Self {
            walls: map.wall_matrix(),
            start: map.start(),
            goal: map.goal(),
            closure: map.closure(),
            accident: map.accident(),
            traffic: map.traffic().to_vec(),
        }
    }
}

/// The state at the start of a tick and the moves proposed from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub tick: u32,
    pub vehicle: Cell,
    pub idle: u32,
    pub driver: Driver,
    /// Authoritative move after the override channel, `None` on the closing record.
    pub action: Option<Action>,
    /// What the other driver would have done.
    pub suggestion: Option<Action>,
    /// Cells that entered the field of vision for the first time on arriving here.
    pub revealed: Vec<Cell>,
    pub committed: Option<Direction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeLog {
    pub name: String,
    pub seed: u64,
    pub header: MapHeader,
    pub ticks: Vec<TickRecord>,
    pub arbitrations: Vec<ArbitrationRecord>,
    pub outcome: EpisodeOutcome,
    pub length: u32,
    pub total_reward: i64,
}

impl EpisodeLog {
    pub fn handoffs(&self) -> usize {
        self.arbitrations.iter().filter(|a| a.switched()).count()
    }

    pub fn final_driver(&self) -> Option<Driver> {
        self.ticks.last().map(|record| record.driver)
    }

    pub fn summary(&self) -> EpisodeSummary {
        EpisodeSummary {
            name: self.name.clone(),
            seed: self.seed,
            outcome: self.outcome,
            length: self.length,
            total_reward: self.total_reward,
            arbitrations: self.arbitrations.len(),
            handoffs: self.handoffs(),
            initial_driver: self.ticks.first().map(|record| record.driver),
            final_driver: self.final_driver(),
            counterfactual: self.arbitrations.iter().any(|a| a.counterfactual),
        }
    }
}

/// One flat row per episode for the CSV writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub name: String,
    pub seed: u64,
    pub outcome: EpisodeOutcome,
    pub length: u32,
    pub total_reward: i64,
    pub arbitrations: usize,
    pub handoffs: usize,
    pub initial_driver: Option<Driver>,
    pub final_driver: Option<Driver>,
    pub counterfactual: bool,
}
