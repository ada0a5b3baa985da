use crate::belief::Belief;
use crate::error::{Result, SimError};
use crate::models::{DecisionPolicy, Observation, ObservationModel};
use crate::planner::{ActionLogit, CostToGo, PlanCache};
use crate::world::{Action, Direction, Driver, GridMap, WorldState};
use rand::Rng;
use std::sync::Arc;
use tracing::trace;

/// One of the two drivers: what it believes, how it perceives and how it decides.
#[derive(Debug)]
pub struct Agent {
    driver: Driver,
    belief: Belief,
    policy: DecisionPolicy,
    sensor: Box<dyn ObservationModel>,
    history: Vec<(Option<Action>, Observation)>,
    keep_history: bool,
    plan: Option<Arc<CostToGo>>,
}

impl Agent {
    pub fn new(driver: Driver, belief: Belief, policy: DecisionPolicy, sensor: Box<dyn ObservationModel>) -> Self {
        Self {
            driver,
            belief,
            policy,
            sensor,
            history: Vec::new(),
            keep_history: true,
            plan: None,
        }
    }

    /// Observations still update the belief but are not kept.
    pub fn without_history(mut self) -> Self {
        self.keep_history = false;
        self
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }

    pub fn belief(&self) -> &Belief {
        &self.belief
    }

    pub fn set_belief(&mut self, belief: Belief) {
        self.belief = belief;
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut DecisionPolicy {
        &mut self.policy
    }

    pub fn history(&self) -> &[(Option<Action>, Observation)] {
        &self.history
    }

    pub fn plan(&self) -> Option<&CostToGo> {
        self.plan.as_deref()
    }

    /// Looks up the table for the current belief unless the held one already
    /// matches it. Returns whether the plan changed.
    pub fn refresh_plan(&mut self, cache: &PlanCache) -> bool {
        let key = self.belief.hazard_key();
        if self.plan.as_ref().is_some_and(|plan| *plan.key() == key) {
            return false;
        }
        trace!("{} replans for {:?}", self.driver, key);
        self.plan = Some(cache.get(&key));
        true
    }

    /// Moves open to the agent from where it believes the vehicle is.
    /// `None` when its plan has no path from there.
    pub fn logits(&self, map: &GridMap) -> Option<Vec<ActionLogit>> {
        self.plan.as_ref()?.logits(map, self.belief.vehicle())
    }

    pub fn act<R: Rng + ?Sized>(
        &self,
        map: &GridMap,
        committed: Option<Direction>,
        in_traffic: bool,
        rng: &mut R,
    ) -> Result<Action> {
        let logits = self.logits(map).unwrap_or_default();
        self.policy
            .sample(&logits, committed, in_traffic, rng)
            .ok_or(SimError::NoFeasiblePath {
                cell: self.belief.vehicle(),
            })
    }

    /// Perceives `state`, records the observation and folds it into the belief.
    pub fn observe(&mut self, map: &GridMap, state: &WorldState, action: Option<Action>) {
        let observation = self.sensor.observe(map, state);
        self.belief = self.belief.revise(state, &observation);
        if self.keep_history {
            self.history.push((action, observation));
        }
    }
}
