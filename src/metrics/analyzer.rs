use crate::simulation::{EpisodeOutcome, EpisodeSummary};
use crate::world::Driver;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub name: String,
    pub episodes: usize,
    pub goal_rate: f64,
    pub no_path_rate: f64,
    pub truncated_rate: f64,
    /// Over episodes that reached the goal.
    pub avg_length: f64,
    pub min_length: u32,
    pub max_length: u32,
    pub avg_reward: f64,
    pub handoff_rate: f64,
    pub avg_arbitrations: f64,
    /// Share of episodes that ended with the AI in control.
    pub ai_final_share: f64,
}

pub fn analyze(summaries: &[EpisodeSummary], name: &str) -> BatchReport {
    if summaries.is_empty() {
        return BatchReport {
            name: name.to_string(),
            episodes: 0,
            goal_rate: 0.0,
            no_path_rate: 0.0,
            truncated_rate: 0.0,
            avg_length: 0.0,
            min_length: 0,
            max_length: 0,
            avg_reward: 0.0,
            handoff_rate: 0.0,
            avg_arbitrations: 0.0,
            ai_final_share: 0.0,
        };
    }

    let n = summaries.len() as f64;
    let rate = |outcome: EpisodeOutcome| summaries.iter().filter(|s| s.outcome == outcome).count() as f64 / n;

    let lengths: Vec<u32> = summaries
        .iter()
        .filter(|s| s.outcome == EpisodeOutcome::GoalReached)
        .map(|s| s.length)
        .collect();
    let avg_length = if lengths.is_empty() {
        0.0
    } else {
        lengths.iter().map(|&l| f64::from(l)).sum::<f64>() / lengths.len() as f64
    };

    BatchReport {
        name: name.to_string(),
        episodes: summaries.len(),
        goal_rate: rate(EpisodeOutcome::GoalReached),
        no_path_rate: rate(EpisodeOutcome::NoFeasiblePath),
        truncated_rate: rate(EpisodeOutcome::Truncated),
        avg_length,
        min_length: lengths.iter().copied().min().unwrap_or(0),
        max_length: lengths.iter().copied().max().unwrap_or(0),
        avg_reward: summaries.iter().map(|s| s.total_reward as f64).sum::<f64>() / n,
        handoff_rate: summaries.iter().filter(|s| s.handoffs > 0).count() as f64 / n,
        avg_arbitrations: summaries.iter().map(|s| s.arbitrations as f64).sum::<f64>() / n,
        ai_final_share: summaries.iter().filter(|s| s.final_driver == Some(Driver::Ai)).count() as f64 / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(outcome: EpisodeOutcome, length: u32, handoffs: usize, final_driver: Driver) -> EpisodeSummary {
        EpisodeSummary {
            name: "t".into(),
            seed: 0,
            outcome,
            length,
            total_reward: 100 - i64::from(length),
            arbitrations: handoffs,
            handoffs,
            initial_driver: Some(Driver::Ai),
            final_driver: Some(final_driver),
            counterfactual: false,
        }
    }

    #[test]
    fn lengths_only_count_finished_episodes() {
        let summaries = [
            summary(EpisodeOutcome::GoalReached, 5, 0, Driver::Ai),
            summary(EpisodeOutcome::GoalReached, 9, 1, Driver::Human),
            summary(EpisodeOutcome::NoFeasiblePath, 2, 0, Driver::Ai),
            summary(EpisodeOutcome::Truncated, 40, 0, Driver::Ai),
        ];
        let report = analyze(&summaries, "mixed");
        assert_eq!(report.episodes, 4);
        assert_eq!(report.goal_rate, 0.5);
        assert_eq!(report.no_path_rate, 0.25);
        assert_eq!(report.avg_length, 7.0);
        assert_eq!((report.min_length, report.max_length), (5, 9));
        assert_eq!(report.handoff_rate, 0.25);
        assert_eq!(report.ai_final_share, 0.75);
    }

    #[test]
    fn empty_batches_report_zeros() {
        let report = analyze(&[], "none");
        assert_eq!(report.episodes, 0);
        assert_eq!(report.goal_rate, 0.0);
    }
}
