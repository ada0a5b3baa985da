use super::{Cell, Direction, Driver, GridMap};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrafficCell {
    pub cell: Cell,
    pub jammed: bool,
}

/// Ground truth of one tick. Owned by the episode and replaced by the transition model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldState {
    pub vehicle: Cell,
    pub goal: Cell,
    pub closure: Option<Cell>,
    pub accident: Option<Cell>,
    pub traffic: Vec<TrafficCell>,
    pub idle: u32,
    pub driver: Driver,
    pub committed: Option<Direction>,
}

impl WorldState {
    pub fn initial(map: &GridMap, driver: Driver) -> Self {
        Self {
            vehicle: map.start(),
            goal: map.goal(),
            closure: map.closure(),
            accident: map.accident(),
            traffic: map.traffic().to_vec(),
            idle: 0,
            driver,
            committed: None,
        }
    }

    pub fn at_goal(&self) -> bool {
        self.vehicle == self.goal
    }

    pub fn is_jammed(&self, cell: Cell) -> bool {
        self.traffic.iter().any(|t| t.cell == cell && t.jammed)
    }

    /// Whether the vehicle currently sits in an active jam.
    pub fn in_traffic(&self) -> bool {
        self.is_jammed(self.vehicle)
    }

    /// Same position, one more idle tick, commitment cleared.
    pub fn stalled(&self) -> Self {
        Self {
            idle: self.idle + 1,
            committed: None,
            ..self.clone()
        }
    }
}
