use crate::planner::ActionLogit;
use crate::world::{Action, Direction};
use rand::Rng;
use rand_distr::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};

/// How an agent picks its next move from the logits of its current plan.
///
/// With a `scaler` the agent samples from a softmax over negative costs. Without
/// one it takes the cheapest move and, with probability `switching`, asks to hand
/// over control instead of driving on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionPolicy {
    pub scaler: Option<f64>,
    pub switching: f64,
}

impl DecisionPolicy {
    pub fn optimal(switching: f64) -> Self {
        Self {
            scaler: None,
            switching,
        }
    }

    pub fn softmax(scaler: f64) -> Self {
        Self {
            scaler: Some(scaler),
            switching: 0.0,
        }
    }

    pub fn set_scaler(&mut self, scaler: Option<f64>) {
        self.scaler = scaler;
    }

    pub fn disable_switching(&mut self) {
        self.switching = 0.0;
    }

    /// `None` when there is no move to choose from.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        logits: &[ActionLogit],
        committed: Option<Direction>,
        in_traffic: bool,
        rng: &mut R,
    ) -> Option<Action> {
        if let Some(direction) = committed {
            return Some(Action::plain(direction));
        }
        if logits.is_empty() {
            return None;
        }

        match self.scaler {
            Some(scaler) => {
                let weights = softmax(logits, scaler);
                let index = WeightedIndex::new(&weights).ok()?.sample(rng);
                Some(Action::plain(logits[index].direction))
            }
            None => {
                let best = cheapest(logits)?;
                let propose = self.switching > 0.0 && rng.r#gen::<f64>() < self.switching && !in_traffic;
                Some(Action {
                    direction: best,
                    propose_switch: propose,
                })
            }
        }
    }

    /// Likelihood of `direction` under this policy, ignoring any switch marker.
    pub fn probability(&self, direction: Direction, logits: &[ActionLogit], committed: Option<Direction>) -> f64 {
        if let Some(committed) = committed {
            return if committed == direction { 1.0 } else { 0.0 };
        }

        match self.scaler {
            Some(scaler) => {
                let weights = softmax(logits, scaler);
                logits
                    .iter()
                    .zip(weights)
                    .find(|(logit, _)| logit.direction == direction)
                    .map(|(_, w)| w)
                    .unwrap_or(0.0)
            }
            None => {
                if cheapest(logits) == Some(direction) { 1.0 } else { 0.0 }
            }
        }
    }
}

/// First strictly cheapest move in logit order.
fn cheapest(logits: &[ActionLogit]) -> Option<Direction> {
    logits
        .iter()
        .fold(None::<&ActionLogit>, |best, logit| match best {
            Some(b) if b.cost <= logit.cost => Some(b),
            _ => Some(logit),
        })
        .map(|logit| logit.direction)
}

/// Normalized softmax of `-scaler * cost`, shifted by the minimum cost.
fn softmax(logits: &[ActionLogit], scaler: f64) -> Vec<f64> {
    let min = logits.iter().map(|l| l.cost).fold(f64::INFINITY, f64::min);
    let weights: Vec<f64> = logits.iter().map(|l| (-scaler * (l.cost - min)).exp()).collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn logits() -> Vec<ActionLogit> {
        vec![
            ActionLogit { direction: Direction::Right, cost: 4.0 },
            ActionLogit { direction: Direction::Up, cost: 4.0 },
            ActionLogit { direction: Direction::Down, cost: 6.0 },
        ]
    }

    #[test]
    fn commitment_overrides_costs() {
        let mut rng = StdRng::seed_from_u64(1);
        let policy = DecisionPolicy::softmax(1.0);
        let action = policy.sample(&logits(), Some(Direction::Left), false, &mut rng);
        assert_eq!(action, Some(Action::plain(Direction::Left)));
        assert_eq!(policy.probability(Direction::Left, &logits(), Some(Direction::Left)), 1.0);
        assert_eq!(policy.probability(Direction::Up, &logits(), Some(Direction::Left)), 0.0);
    }

    #[test]
    fn optimal_takes_first_cheapest() {
        let mut rng = StdRng::seed_from_u64(1);
        let policy = DecisionPolicy::optimal(0.0);
        let action = policy.sample(&logits(), None, false, &mut rng);
        assert_eq!(action, Some(Action::plain(Direction::Right)));
        assert_eq!(policy.probability(Direction::Right, &logits(), None), 1.0);
        assert_eq!(policy.probability(Direction::Up, &logits(), None), 0.0);
    }

    #[test]
    fn certain_switching_proposes_unless_jammed() {
        let mut rng = StdRng::seed_from_u64(7);
        let policy = DecisionPolicy::optimal(1.0);
        let free = policy.sample(&logits(), None, false, &mut rng).unwrap();
        let stuck = policy.sample(&logits(), None, true, &mut rng).unwrap();
        assert!(free.propose_switch);
        assert!(!stuck.propose_switch);
        assert_eq!(free.direction, Direction::Right);
    }

    #[test]
    fn softmax_likelihoods_sum_to_one() {
        let policy = DecisionPolicy::softmax(1.0);
        let total: f64 = Direction::ALL
            .iter()
            .map(|&d| policy.probability(d, &logits(), None))
            .sum();
        assert!((total - 1.0).abs() < 1e-12);

        let right = policy.probability(Direction::Right, &logits(), None);
        let down = policy.probability(Direction::Down, &logits(), None);
        assert!((right / down - 2f64.exp()).abs() < 1e-9);
        assert_eq!(policy.probability(Direction::Left, &logits(), None), 0.0);
    }

    #[test]
    fn empty_logits_mean_no_action() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(DecisionPolicy::optimal(0.0).sample(&[], None, false, &mut rng), None);
        assert_eq!(DecisionPolicy::softmax(1.0).sample(&[], None, false, &mut rng), None);
    }

    #[test]
    fn softmax_sampling_is_reproducible() {
        let policy = DecisionPolicy::softmax(0.5);
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..20)
                .map(|_| policy.sample(&logits(), None, false, &mut rng).unwrap().direction)
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(11), draw(11));
    }
}
