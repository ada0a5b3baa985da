pub mod visibility;
pub mod dynamics;
pub mod reward;
pub mod policy;

pub use visibility::{Observation, Visibility};
pub use dynamics::Dynamics;
pub use reward::GoalReward;
pub use policy::DecisionPolicy;

use crate::world::{Action, GridMap, WorldState};
use std::fmt;

/// What an agent perceives of a state.
pub trait ObservationModel: Send + Sync + fmt::Debug {
    fn observe(&self, map: &GridMap, state: &WorldState) -> Observation;
    fn name(&self) -> &str;
}

/// Deterministic environment step.
pub trait TransitionModel: Send + Sync + fmt::Debug {
    fn next_state(&self, map: &GridMap, state: &WorldState, action: Action) -> WorldState;
    fn name(&self) -> &str;
}

pub trait RewardModel: Send + Sync + fmt::Debug {
    fn reward(&self, state: &WorldState, next_state: &WorldState) -> i32;
    fn name(&self) -> &str;
}
