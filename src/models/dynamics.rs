use super::TransitionModel;
use crate::world::{Action, Driver, GridMap, WorldState};

/// Movement rules of the vehicle.
#[derive(Debug, Clone, Copy)]
pub struct Dynamics {
    /// Ticks a jam holds the vehicle.
    pub traffic_delay: u32,
    /// Extra ticks a human driver dwells on each cell, also added to jam delays.
    pub human_dwell: u32,
}

impl Dynamics {
    pub fn new(traffic_delay: u32, human_dwell: u32) -> Self {
        Self {
            traffic_delay,
            human_dwell,
        }
    }

    fn dwell(&self, driver: Driver) -> u32 {
        match driver {
            Driver::Human => self.human_dwell,
            Driver::Ai => 0,
        }
    }
}

impl TransitionModel for Dynamics {
    fn next_state(&self, map: &GridMap, state: &WorldState, action: Action) -> WorldState {
        if action.propose_switch {
            return WorldState {
                idle: state.idle + 1,
                committed: Some(action.direction),
                ..state.clone()
            };
        }

        let dwell = self.dwell(state.driver);
        if state.in_traffic() && state.idle < self.traffic_delay + dwell {
            return state.stalled();
        }
        if state.idle < dwell {
            return state.stalled();
        }

        let target = state.vehicle.step(action.direction);
        let blocked = !map.is_road(target) || Some(target) == state.accident || Some(target) == state.closure;
        if blocked {
            return state.stalled();
        }

        WorldState {
            vehicle: target,
            idle: 0,
            committed: None,
            ..state.clone()
        }
    }

    fn name(&self) -> &str {
        "dynamics"
    }
}
