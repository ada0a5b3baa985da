use crate::belief::Belief;
use crate::error::Result;
use crate::simulation::SimContext;
use crate::simulation::episode::Episode;
use crate::simulation::log::EpisodeOutcome;
use crate::world::{Driver, TrafficCell, WorldState};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutOutcome {
    Finished { ticks: u32 },
    /// No feasible path, or the rollout tick cap ran out.
    Unfinished,
}

impl RolloutOutcome {
    pub fn finished(&self) -> bool {
        matches!(self, RolloutOutcome::Finished { .. })
    }
}

/// One imagined future of the episode under a fixed controller. The world is
/// the human's picture of it: hazards where the human believes them to be and
/// traffic drawn from the human's belief.
#[derive(Debug, Clone)]
pub struct Rollout {
    driver: Driver,
    state: WorldState,
    ai_belief: Belief,
    human_belief: Belief,
    seed: u64,
}

impl Rollout {
    /// `traffic` is the sampled jam state of every traffic cell.
    pub fn new(driver: Driver, current: &WorldState, ai: &Belief, human: &Belief, traffic: Vec<bool>, seed: u64) -> Self {
        let mut state = WorldState {
            closure: human.closure(),
            accident: human.accident(),
            traffic: current
                .traffic
                .iter()
                .zip(&traffic)
                .map(|(t, &jammed)| TrafficCell { cell: t.cell, jammed })
                .collect(),
            driver,
            ..current.clone()
        };

        let (ai_belief, human_belief) = match driver {
            // the human drives on what it believes now; the pending commitment is dropped
            Driver::Human => {
                state.committed = None;
                (Belief::initial_ai(&state), human.clone())
            }
            // the AI keeps its commitment and plans on the sampled traffic
            Driver::Ai => {
                let sampled = traffic.iter().map(|&jammed| if jammed { 1.0 } else { 0.0 }).collect();
                (ai.with_traffic(sampled), Belief::initial_human(&state))
            }
        };

        Self {
            driver,
            state,
            ai_belief,
            human_belief,
            seed,
        }
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn run(self, ctx: &SimContext) -> Result<RolloutOutcome> {
        let (driver, seed) = (self.driver, self.seed);
        let mut episode = Episode::rollout(ctx, self.state, self.ai_belief, self.human_belief, seed);
        let outcome = match episode.drive()? {
            EpisodeOutcome::GoalReached => RolloutOutcome::Finished { ticks: episode.tick() },
            EpisodeOutcome::NoFeasiblePath | EpisodeOutcome::Truncated => RolloutOutcome::Unfinished,
        };
        trace!("Rollout {} seed {}: {:?}", driver, seed, outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Cell, Direction, GridMap};

    const WORLD: &str = "
        - - g
        t c a
        v T -
    ";

    #[test]
    fn rollout_world_follows_the_human_picture() {
        let map = GridMap::parse(WORLD).unwrap();
        let mut current = WorldState::initial(&map, Driver::Ai);
        current.committed = Some(Direction::Up);
        let ai = Belief::initial_ai(&current);
        let human = Belief::initial_human(&current);

        let keep = Rollout::new(Driver::Human, &current, &ai, &human, vec![true, false], 1);
        assert_eq!(keep.state().closure, Some(Cell::new(1, 1)));
        // the accident has not been seen, so it is not in the imagined world
        assert_eq!(keep.state().accident, None);
        assert!(keep.state().traffic[0].jammed);
        assert!(!keep.state().traffic[1].jammed);
        assert_eq!(keep.state().committed, None);
        assert_eq!(keep.state().driver, Driver::Human);

        let hand = Rollout::new(Driver::Ai, &current, &ai, &human, vec![false, true], 2);
        assert_eq!(hand.state().committed, Some(Direction::Up));
        assert_eq!(hand.ai_belief.traffic(), &[0.0, 1.0]);
        assert_eq!(hand.human_belief.traffic(), &[0.5, 0.5]);
    }
}
