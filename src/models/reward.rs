use super::RewardModel;
use crate::world::WorldState;

pub const GOAL_REWARD: i32 = 100;
pub const STEP_REWARD: i32 = -1;

/// +100 on the tick the goal is reached, -1 on every other tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoalReward;

impl RewardModel for GoalReward {
    fn reward(&self, state: &WorldState, next_state: &WorldState) -> i32 {
        if !state.at_goal() && next_state.at_goal() {
            GOAL_REWARD
        } else {
            STEP_REWARD
        }
    }

    fn name(&self) -> &str {
        "goal-reward"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Cell, Driver, GridMap};

    #[test]
    fn pays_out_only_on_arrival() {
        let map = GridMap::parse("v g").unwrap();
        let before = WorldState::initial(&map, Driver::Ai);
        let mut arrived = before.clone();
        arrived.vehicle = Cell::new(0, 1);

        assert_eq!(GoalReward.reward(&before, &arrived), GOAL_REWARD);
        assert_eq!(GoalReward.reward(&before, &before), STEP_REWARD);
        assert_eq!(GoalReward.reward(&arrived, &arrived), STEP_REWARD);
    }
}
