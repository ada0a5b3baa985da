use super::SimContext;
use super::decisions::{DecisionSource, Prompt};
use super::log::{EpisodeLog, EpisodeOutcome, MapHeader, TickRecord};
use crate::agent::Agent;
use crate::arbitration::{ArbitrationRecord, Arbitrator};
use crate::belief::{Belief, BeliefFilter};
use crate::error::{Result, SimError};
use crate::models::{DecisionPolicy, Dynamics, GoalReward, RewardModel, TransitionModel, Visibility};
use crate::world::{Action, Cell, Driver, WorldState};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fmt;
use tracing::{debug, info};

/// One run of the shared-control task, advanced a tick at a time.
///
/// A factual episode arbitrates handoffs and may consult an override channel.
/// A rollout episode (see [`Episode::rollout`]) never does either.
pub struct Episode {
    ctx: SimContext,
    state: WorldState,
    ai: Agent,
    human: Agent,
    transition: Box<dyn TransitionModel>,
    reward: Box<dyn RewardModel>,
    filter: BeliefFilter,
    window: Visibility,
    arbitrator: Option<Arbitrator>,
    decisions: Option<Box<dyn DecisionSource>>,
    rng: StdRng,
    seed: u64,
    switching_enabled: bool,
    max_ticks: Option<u32>,
    tick: u32,
    explored: Vec<bool>,
    revealed: Vec<Cell>,
    records: Vec<TickRecord>,
    arbitrations: Vec<ArbitrationRecord>,
    total_reward: i64,
    outcome: Option<EpisodeOutcome>,
}

impl fmt::Debug for Episode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Episode")
            .field("name", &self.ctx.config.name)
            .field("tick", &self.tick)
            .field("state", &self.state)
            .field("switching_enabled", &self.switching_enabled)
            .field("outcome", &self.outcome)
            .finish()
    }
}

impl Episode {
    pub fn new(ctx: SimContext, decisions: Option<Box<dyn DecisionSource>>) -> Self {
        let config = &ctx.config;
        let state = WorldState::initial(&ctx.map, config.initial_driver);
        let ai = Agent::new(
            Driver::Ai,
            Belief::initial_ai(&state),
            DecisionPolicy {
                scaler: config.ai_scaler,
                switching: config.ai_switching,
            },
            Box::new(Visibility::new(Driver::Ai, config.radius)),
        );
        let human = Agent::new(
            Driver::Human,
            Belief::initial_human(&state),
            DecisionPolicy {
                scaler: config.human_scaler,
                switching: config.human_switching,
            },
            Box::new(Visibility::new(Driver::Human, config.radius)),
        );
        let arbitrator = Some(Arbitrator::new(config));
        let (seed, max_ticks) = (config.seed, config.max_ticks);

        Self::assemble(ctx, state, ai, human, arbitrator, decisions, seed, max_ticks, true)
    }

    /// A future imagined by the human to score a handoff: both drivers sample at
    /// the simulation temperature, switching is off and the tick cap applies.
    /// Only the tick count matters, so no log is kept.
    pub fn rollout(ctx: &SimContext, state: WorldState, ai_belief: Belief, human_belief: Belief, seed: u64) -> Self {
        let config = &ctx.config;
        let policy = DecisionPolicy::softmax(config.sim_scaler);
        let ai = Agent::new(Driver::Ai, ai_belief, policy, Box::new(Visibility::new(Driver::Ai, config.radius)))
            .without_history();
        let human = Agent::new(
            Driver::Human,
            human_belief,
            policy,
            Box::new(Visibility::new(Driver::Human, config.radius)),
        )
        .without_history();
        let max_ticks = Some(config.rollout_max_ticks);

        Self::assemble(ctx.clone(), state, ai, human, None, None, seed, max_ticks, false)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        ctx: SimContext,
        state: WorldState,
        ai: Agent,
        human: Agent,
        arbitrator: Option<Arbitrator>,
        decisions: Option<Box<dyn DecisionSource>>,
        seed: u64,
        max_ticks: Option<u32>,
        switching_enabled: bool,
    ) -> Self {
        let config = &ctx.config;
        let transition = Box::new(Dynamics::new(config.traffic_delay, config.human_dwell));
        let filter = BeliefFilter::new(config.sim_scaler);
        let window = Visibility::new(Driver::Ai, config.radius);
        let cells = if arbitrator.is_some() { ctx.map.rows() * ctx.map.cols() } else { 0 };

        let mut episode = Self {
            ctx,
            state,
            ai,
            human,
            transition,
            reward: Box::new(GoalReward),
            filter,
            window,
            arbitrator,
            decisions,
            rng: StdRng::seed_from_u64(seed),
            seed,
            switching_enabled,
            max_ticks,
            tick: 0,
            explored: vec![false; cells],
            revealed: Vec::new(),
            records: Vec::new(),
            arbitrations: Vec::new(),
            total_reward: 0,
            outcome: None,
        };

        episode.ai.observe(&episode.ctx.map, &episode.state, None);
        episode.human.observe(&episode.ctx.map, &episode.state, None);
        episode.explore();
        episode
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn agent(&self, driver: Driver) -> &Agent {
        match driver {
            Driver::Ai => &self.ai,
            Driver::Human => &self.human,
        }
    }

    pub fn switching_enabled(&self) -> bool {
        self.switching_enabled
    }

    pub fn records(&self) -> &[TickRecord] {
        &self.records
    }

    pub fn outcome(&self) -> Option<EpisodeOutcome> {
        self.outcome
    }

    /// Rollouts keep no tick records.
    fn logging(&self) -> bool {
        self.arbitrator.is_some()
    }

    /// Advances one tick. Returns the outcome once the episode is over; later
    /// calls keep returning it without touching the state.
    pub fn step(&mut self) -> Result<Option<EpisodeOutcome>> {
        if self.outcome.is_some() {
            return Ok(self.outcome);
        }
        if self.state.at_goal() {
            if !self.logging() {
                return Ok(self.finish_with(EpisodeOutcome::GoalReached));
            }
            self.records.push(TickRecord {
                tick: self.tick,
                vehicle: self.state.vehicle,
                idle: self.state.idle,
                driver: self.state.driver,
                action: None,
                suggestion: None,
                revealed: std::mem::take(&mut self.revealed),
                committed: self.state.committed,
            });
            return Ok(self.finish_with(EpisodeOutcome::GoalReached));
        }
        if self.max_ticks.is_some_and(|cap| self.tick >= cap) {
            return Ok(self.finish_with(EpisodeOutcome::Truncated));
        }

        self.ai.refresh_plan(&self.ctx.cache);
        self.human.refresh_plan(&self.ctx.cache);

        let driver = self.state.driver;
        let committed = self.state.committed;
        let in_traffic = self.state.in_traffic();
        let (controller, codriver) = match driver {
            Driver::Ai => (&self.ai, &self.human),
            Driver::Human => (&self.human, &self.ai),
        };

        let proposed = controller.act(&self.ctx.map, committed, in_traffic, &mut self.rng);
        let suggestion = codriver.act(&self.ctx.map, committed, in_traffic, &mut self.rng).ok();
        let mut action = match proposed {
            Ok(action) => action,
            Err(SimError::NoFeasiblePath { cell }) => {
                info!("No feasible path for the {} from {} after tick {}", driver, cell, self.tick);
                return Ok(self.finish_with(EpisodeOutcome::NoFeasiblePath));
            }
            Err(e) => return Err(e),
        };

        if !self.switching_enabled {
            action = action.stripped();
        } else if let Some(decisions) = self.decisions.as_mut() {
            let token = ask(decisions.as_mut(), Prompt::Offer { driver })?;
            action.propose_switch = token == "y";
        }

        if self.logging() {
            self.records.push(TickRecord {
                tick: self.tick,
                vehicle: self.state.vehicle,
                idle: self.state.idle,
                driver,
                action: Some(action),
                suggestion,
                revealed: std::mem::take(&mut self.revealed),
                committed,
            });
        }

        if driver == Driver::Ai {
            self.refine_human_belief(action);
        }

        let next = if action.propose_switch {
            self.arbitrate(action)?
        } else {
            self.transition.next_state(&self.ctx.map, &self.state, action)
        };

        self.total_reward += i64::from(self.reward.reward(&self.state, &next));
        self.ai.observe(&self.ctx.map, &next, Some(action));
        self.human.observe(&self.ctx.map, &next, Some(action));
        self.state = next;
        self.explore();
        self.tick += 1;
        Ok(None)
    }

    /// Steps until the episode is over.
    pub fn drive(&mut self) -> Result<EpisodeOutcome> {
        loop {
            if let Some(outcome) = self.step()? {
                return Ok(outcome);
            }
        }
    }

    pub fn run(mut self) -> Result<EpisodeLog> {
        info!(
            "Starting episode {} (seed {}, {} drives)",
            self.ctx.config.name, self.seed, self.state.driver
        );
        let outcome = self.drive()?;
        self.ctx.metrics.episode_finished(u64::from(self.tick));
        info!(
            "Episode {} finished: {:?} after {} ticks, reward {}",
            self.ctx.config.name, outcome, self.tick, self.total_reward
        );
        Ok(self.into_log())
    }

    pub fn into_log(self) -> EpisodeLog {
        EpisodeLog {
            name: self.ctx.config.name.clone(),
            seed: self.seed,
            header: MapHeader::new(&self.ctx.map),
            length: self.records.len() as u32,
            ticks: self.records,
            arbitrations: self.arbitrations,
            outcome: self.outcome.unwrap_or(EpisodeOutcome::Truncated),
            total_reward: self.total_reward,
        }
    }

    fn finish_with(&mut self, outcome: EpisodeOutcome) -> Option<EpisodeOutcome> {
        self.outcome = Some(outcome);
        self.outcome
    }

    /// The human reads the AI's move as evidence about the traffic it can see.
    fn refine_human_belief(&mut self, action: Action) {
        let refined = self.filter.refine(
            &self.ctx.cache,
            self.human.belief(),
            self.ai.belief().closure(),
            action.direction,
        );
        if refined != *self.human.belief() {
            debug!(
                "Tick {}: human traffic belief {:?} -> {:?}",
                self.tick,
                self.human.belief().traffic(),
                refined.traffic()
            );
            self.ctx.metrics.belief_refined();
            self.human.set_belief(refined);
        }
    }

    fn arbitrate(&mut self, action: Action) -> Result<WorldState> {
        let Some(arbitrator) = self.arbitrator else {
            return Ok(self.transition.next_state(&self.ctx.map, &self.state, action.stripped()));
        };
        let driver = self.state.driver;

        let scores = arbitrator.score(
            &self.ctx,
            &self.state,
            self.ai.belief(),
            self.human.belief(),
            self.tick,
            &mut self.rng,
        )?;
        let (sampled, p_ai) = arbitrator.decide(scores, &mut self.rng)?;

        let mut resolved = sampled;
        let mut token = None;
        let mut branch = false;
        if let Some(decisions) = self.decisions.as_mut() {
            let answer = ask(decisions.as_mut(), Prompt::Resolve { driver })?;
            resolved = if answer.starts_with('y') { driver.other() } else { driver };
            branch = answer.ends_with("cf");
            token = Some(answer);
        }
        if branch && self.ctx.config.counterfactual.is_none() {
            return Err(SimError::CounterfactualUnconfigured);
        }

        let record = ArbitrationRecord {
            tick: self.tick,
            driver,
            scores,
            p_ai,
            sampled,
            resolved,
            token,
            counterfactual: branch,
        };
        self.ctx.metrics.arbitration(record.switched());
        self.arbitrations.push(record);

        let next = if resolved != driver {
            info!("Tick {}: control passes from the {} to the {}", self.tick, driver, resolved);
            self.disable_switching();
            WorldState {
                driver: resolved,
                ..self.state.stalled()
            }
        } else {
            debug!("Tick {}: the {} keeps control", self.tick, driver);
            self.transition.next_state(&self.ctx.map, &self.state, action.stripped())
        };

        if branch {
            self.start_counterfactual()?;
        }
        Ok(next)
    }

    fn disable_switching(&mut self) {
        self.switching_enabled = false;
        self.ai.policy_mut().disable_switching();
        self.human.policy_mut().disable_switching();
    }

    /// Keeps the decision just made and continues under the branch parameters.
    fn start_counterfactual(&mut self) -> Result<()> {
        let branch = self
            .ctx
            .config
            .counterfactual
            .clone()
            .ok_or(SimError::CounterfactualUnconfigured)?;

        info!("Tick {}: counterfactual branch with seed {}", self.tick, branch.seed);
        self.disable_switching();
        self.rng = StdRng::seed_from_u64(branch.seed);
        self.ai.policy_mut().set_scaler(branch.ai_scaler);
        self.human.policy_mut().set_scaler(branch.human_scaler);
        Ok(())
    }

    /// Marks the cells around the vehicle as explored and remembers which were new.
    fn explore(&mut self) {
        if !self.logging() {
            return;
        }
        let map = &self.ctx.map;
        let explored = &mut self.explored;
        let fresh: Vec<Cell> = self
            .window
            .field_of_vision(map, self.state.vehicle)
            .into_iter()
            .filter(|&cell| match map.index(cell) {
                Some(i) if !explored[i] => {
                    explored[i] = true;
                    true
                }
                _ => false,
            })
            .collect();
        self.revealed.extend(fresh);
    }
}

fn ask(source: &mut dyn DecisionSource, prompt: Prompt) -> Result<String> {
    let token = source.decide(&prompt)?.trim().to_string();
    if prompt.accepts(&token) {
        Ok(token)
    } else {
        Err(SimError::InvalidOverrideToken {
            prompt: prompt.to_string(),
            token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsCollector;
    use crate::simulation::{ScriptedDecisions, SimConfig};
    use crate::world::{Direction, GridMap};

    const OPEN: &str = "
        - - g
        - - -
        v - -
    ";

    fn episode(world: &str, config: SimConfig, script: Option<&[&str]>) -> Episode {
        let ctx = SimContext::new(GridMap::parse(world).unwrap(), config, MetricsCollector::new());
        let decisions = script.map(|tokens| Box::new(ScriptedDecisions::new(tokens.iter().copied())) as Box<dyn DecisionSource>);
        Episode::new(ctx, decisions)
    }

    #[test]
    fn optimal_ai_drives_the_shortest_route() {
        let config = SimConfig::default().with_switching(0.0, 0.0);
        let log = episode(OPEN, config, None).run().unwrap();

        assert_eq!(log.outcome, EpisodeOutcome::GoalReached);
        assert_eq!(log.length, 5);
        assert_eq!(log.ticks.len(), 5);
        assert_eq!(log.total_reward, 97);
        assert_eq!(log.ticks.last().unwrap().vehicle, Cell::new(0, 2));
        assert!(log.ticks.last().unwrap().action.is_none());
        assert!(log.arbitrations.is_empty());
        // the first record sees the whole 2x2 corner around the start
        assert_eq!(log.ticks[0].revealed.len(), 4);
    }

    #[test]
    fn walled_in_vehicle_ends_with_a_partial_log() {
        let config = SimConfig::default().with_switching(0.0, 0.0);
        let log = episode("v * g\n- * -", config, None).run().unwrap();
        assert_eq!(log.outcome, EpisodeOutcome::NoFeasiblePath);
        assert_eq!(log.length, 0);
        assert!(log.ticks.is_empty());
    }

    #[test]
    fn tick_cap_truncates() {
        let config = SimConfig::default().with_switching(0.0, 0.0).with_max_ticks(Some(2));
        let log = episode(OPEN, config, None).run().unwrap();
        assert_eq!(log.outcome, EpisodeOutcome::Truncated);
        assert_eq!(log.length, 2);
    }

    #[test]
    fn accepted_takeover_switches_once() {
        let config = SimConfig::default().with_switching(0.0, 0.0).with_rollouts(4);
        let mut episode = episode(OPEN, config, Some(&["y", "y"]));

        assert_eq!(episode.step().unwrap(), None);
        assert_eq!(episode.state().driver, Driver::Human);
        assert_eq!(episode.state().vehicle, Cell::new(2, 0));
        assert_eq!(episode.state().idle, 1);
        assert_eq!(episode.state().committed, None);
        assert!(!episode.switching_enabled());

        // no further prompts: the script is empty and the episode still finishes
        let outcome = episode.drive().unwrap();
        assert_eq!(outcome, EpisodeOutcome::GoalReached);
        let log = episode.into_log();
        assert_eq!(log.handoffs(), 1);
        assert_eq!(log.ticks[0].action, Some(Action::proposing(Direction::Right)));
        assert!(log.ticks[1..].iter().all(|r| r.action.is_none_or(|a| !a.propose_switch)));
        assert!(log.ticks[1..].iter().all(|r| r.driver == Driver::Human));
    }

    #[test]
    fn declined_takeover_executes_the_move() {
        let config = SimConfig::default().with_switching(0.0, 0.0).with_rollouts(4);
        let mut episode = episode(OPEN, config, Some(&["y", "n", "n"]));

        episode.step().unwrap();
        assert_eq!(episode.state().driver, Driver::Ai);
        assert_eq!(episode.state().vehicle, Cell::new(2, 1));
        assert!(episode.switching_enabled());

        episode.step().unwrap();
        let log = episode.into_log();
        assert_eq!(log.arbitrations.len(), 1);
        assert!(!log.arbitrations[0].switched());
        assert_eq!(log.ticks[1].action, Some(Action::plain(Direction::Right)));
    }

    #[test]
    fn override_tokens_are_validated() {
        let config = SimConfig::default().with_switching(0.0, 0.0);
        let mut bad = episode(OPEN, config.clone(), Some(&["maybe"]));
        assert!(matches!(bad.step(), Err(SimError::InvalidOverrideToken { .. })));

        let mut dry = episode(OPEN, config.clone(), Some(&[]));
        assert!(matches!(dry.step(), Err(SimError::ScriptExhausted { .. })));

        let mut unconfigured = episode(OPEN, config.with_rollouts(2), Some(&["y", "ycf"]));
        assert_eq!(unconfigured.step(), Err(SimError::CounterfactualUnconfigured));
    }

    #[test]
    fn counterfactual_branch_freezes_switching() {
        let config = SimConfig::default()
            .with_switching(0.0, 0.0)
            .with_rollouts(2)
            .with_counterfactual(11, Some(1.0), Some(1.0));
        let mut episode = episode(OPEN, config, Some(&["y", "ncf"]));

        episode.step().unwrap();
        assert_eq!(episode.state().driver, Driver::Ai);
        assert!(!episode.switching_enabled());
        assert_eq!(episode.agent(Driver::Ai).policy().scaler, Some(1.0));
        assert_eq!(episode.drive().unwrap(), EpisodeOutcome::GoalReached);
        assert!(episode.into_log().arbitrations[0].counterfactual);
    }

    #[test]
    fn declined_offer_strips_a_drawn_proposal() {
        // the optimal AI always asks to hand over; the override says no
        let config = SimConfig::default().with_switching(1.0, 0.0).with_rollouts(2);
        let mut episode = episode(OPEN, config, Some(&["n"]));

        assert_eq!(episode.step().unwrap(), None);
        assert_eq!(episode.records()[0].action, Some(Action::plain(Direction::Right)));
        assert_eq!(episode.state().vehicle, Cell::new(2, 1));
        assert_eq!(episode.state().driver, Driver::Ai);
        assert!(episode.switching_enabled());
        assert!(episode.into_log().arbitrations.is_empty());
    }

    fn take_over_branch(seed: u64) -> Episode {
        let config = SimConfig::default()
            .with_seed(seed)
            .with_switching(0.0, 0.0)
            .with_rollouts(2)
            .with_counterfactual(5, Some(2.0), Some(2.0));
        episode(OPEN, config, Some(&["y", "ycf"]))
    }

    #[test]
    fn take_over_branch_hands_control_and_reseeds() {
        let mut episode = take_over_branch(1);
        episode.step().unwrap();

        assert_eq!(episode.state().driver, Driver::Human);
        assert_eq!(episode.state().vehicle, Cell::new(2, 0));
        assert!(!episode.switching_enabled());
        assert_eq!(episode.agent(Driver::Human).policy().scaler, Some(2.0));
        assert_eq!(episode.agent(Driver::Ai).policy().scaler, Some(2.0));
        assert_eq!(episode.drive().unwrap(), EpisodeOutcome::GoalReached);

        let log = episode.into_log();
        assert_eq!(log.arbitrations.len(), 1);
        assert!(log.arbitrations[0].switched());
        assert!(log.arbitrations[0].counterfactual);
        assert_eq!(log.arbitrations[0].token.as_deref(), Some("ycf"));
        assert!(log.ticks[1..].iter().all(|r| r.driver == Driver::Human));

        // after the branch only its own seed drives the sampling human
        let other = take_over_branch(2).run().unwrap();
        assert_eq!(other.ticks, log.ticks);
    }

    #[test]
    fn rollouts_keep_no_log() {
        let ctx = SimContext::new(GridMap::parse(OPEN).unwrap(), SimConfig::default(), MetricsCollector::new());
        let state = WorldState::initial(&ctx.map, Driver::Human);
        let (ai, human) = (Belief::initial_ai(&state), Belief::initial_human(&state));
        let mut rollout = Episode::rollout(&ctx, state, ai, human, 3);

        assert_eq!(rollout.drive().unwrap(), EpisodeOutcome::GoalReached);
        assert!(rollout.tick() >= 4);
        assert!(rollout.records().is_empty());
        assert!(rollout.agent(Driver::Ai).history().is_empty());
        assert!(rollout.agent(Driver::Human).history().is_empty());
    }
}
