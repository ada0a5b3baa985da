use super::Belief;
use crate::models::DecisionPolicy;
use crate::planner::{HazardKey, JamLevel, PlanCache};
use crate::world::{Cell, Direction};
use tracing::debug;

/// Above this many unknown cells the hypothesis tables are planned on demand
/// instead of being kept in the shared cache.
pub const CACHED_UNKNOWN_TRAFFIC: usize = 10;

/// Bayesian refinement of the human's traffic beliefs from the directions the AI
/// takes. The human models the AI as a softmax planner that knows the true
/// traffic, the closure only if it has seen it, and the same accident as the human.
#[derive(Debug, Clone, Copy)]
pub struct BeliefFilter {
    model: DecisionPolicy,
}

impl BeliefFilter {
    pub fn new(sim_scaler: f64) -> Self {
        Self {
            model: DecisionPolicy::softmax(sim_scaler),
        }
    }

    pub fn refine(
        &self,
        cache: &PlanCache,
        belief: &Belief,
        ai_closure: Option<Cell>,
        direction: Direction,
    ) -> Belief {
        let unknown = belief.unknown_traffic();
        if unknown.is_empty() {
            return belief.clone();
        }
        let transient = unknown.len() > CACHED_UNKNOWN_TRAFFIC;

        let probabilities = belief.traffic();
        let mut levels: Vec<JamLevel> = probabilities.iter().map(|&p| JamLevel::from_probability(p)).collect();
        let mut jammed = vec![false; unknown.len()];
        let mut jammed_mass = vec![0.0; unknown.len()];
        let mut total = 0.0;

        // binary counter over the unknown cells, all clear first
        loop {
            let mut prior = 1.0;
            for (&bit, &i) in jammed.iter().zip(&unknown) {
                levels[i] = JamLevel::from_jammed(bit);
                prior *= if bit { probabilities[i] } else { 1.0 - probabilities[i] };
            }

            let key = HazardKey::new(ai_closure, belief.accident(), levels.iter().copied());
            let table = if transient { cache.get_transient(&key) } else { cache.get(&key) };
            let likelihood = table
                .logits(cache.map(), belief.vehicle())
                .map(|logits| self.model.probability(direction, &logits, None))
                .unwrap_or(0.0);

            let weight = prior * likelihood;
            total += weight;
            for (&bit, mass) in jammed.iter().zip(jammed_mass.iter_mut()) {
                if bit {
                    *mass += weight;
                }
            }

            match jammed.iter().position(|&bit| !bit) {
                Some(first_clear) => {
                    jammed[..first_clear].fill(false);
                    jammed[first_clear] = true;
                }
                None => break,
            }
        }

        if total <= 0.0 {
            debug!("Direction {} impossible under every traffic hypothesis, belief kept", direction);
            return belief.clone();
        }

        let mut posterior = probabilities.to_vec();
        for (&i, mass) in unknown.iter().zip(jammed_mass) {
            posterior[i] = mass / total;
        }
        belief.with_traffic(posterior)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsCollector;
    use crate::world::{GridMap, Driver, WorldState};
    use std::sync::Arc;

    // two four-move routes, each through one traffic cell
    const FORK: &str = "
        - - g
        t * t
        v - -
    ";

    fn setup() -> (PlanCache, Belief) {
        let map = Arc::new(GridMap::parse(FORK).unwrap());
        let state = WorldState::initial(&map, Driver::Ai);
        let belief = Belief::initial_human(&state);
        (PlanCache::new(map, 10, MetricsCollector::new()), belief)
    }

    #[test]
    fn known_traffic_is_left_alone() {
        let (cache, belief) = setup();
        let known = belief.with_traffic(vec![1.0, 0.0]);
        let refined = BeliefFilter::new(1.0).refine(&cache, &known, None, Direction::Right);
        assert_eq!(refined, known);
        assert!(cache.is_empty());
    }

    #[test]
    fn avoiding_a_route_suggests_it_is_jammed() {
        let (cache, belief) = setup();
        let refined = BeliefFilter::new(1.0).refine(&cache, &belief, None, Direction::Right);
        let [up_route, right_route] = [refined.traffic()[0], refined.traffic()[1]];

        assert!(up_route > 0.5, "up route posterior {}", up_route);
        assert!(right_route < 0.5, "right route posterior {}", right_route);
        for p in refined.traffic() {
            assert!((0.0..=1.0).contains(p));
            assert_eq!(*p, crate::belief::round_probability(*p));
        }
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn impossible_directions_keep_the_belief() {
        let (cache, belief) = setup();
        let refined = BeliefFilter::new(1.0).refine(&cache, &belief, None, Direction::Left);
        assert_eq!(refined, belief);
    }

    #[test]
    fn many_unknown_cells_are_enumerated_without_caching() {
        // a corridor leaves one move under every hypothesis, so nothing is learned
        let world = format!("v {} g", vec!["t"; 17].join(" "));
        let map = Arc::new(GridMap::parse(&world).unwrap());
        let metrics = MetricsCollector::new();
        let cache = PlanCache::new(map.clone(), 10, metrics.clone());
        let belief = Belief::initial_human(&WorldState::initial(&map, Driver::Ai));

        let refined = BeliefFilter::new(1.0).refine(&cache, &belief, None, Direction::Right);
        assert_eq!(refined.traffic(), belief.traffic());
        assert!(cache.is_empty());
        assert_eq!(metrics.snapshot().plans_computed, 1 << 17);
    }
}
