pub mod config;
pub mod decisions;
pub mod episode;
pub mod log;

pub use config::{CounterfactualConfig, SimConfig};
pub use decisions::{DecisionSource, Prompt, RecordingDecisions, ResponseScript, ScriptedDecisions};
pub use episode::Episode;
pub use log::{EpisodeLog, EpisodeOutcome, EpisodeSummary, TickRecord};

use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::planner::PlanCache;
use crate::world::GridMap;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::info;

/// Everything an episode shares with its rollouts: the world, the parameters,
/// the plan cache and the counters.
#[derive(Debug, Clone)]
pub struct SimContext {
    pub config: Arc<SimConfig>,
    pub map: Arc<GridMap>,
    pub cache: Arc<PlanCache>,
    pub metrics: MetricsCollector,
}

impl SimContext {
    pub fn new(map: GridMap, config: SimConfig, metrics: MetricsCollector) -> Self {
        let map = Arc::new(map);
        let cache = Arc::new(PlanCache::new(Arc::clone(&map), config.traffic_delay, metrics.clone()));
        Self {
            config: Arc::new(config),
            map,
            cache,
            metrics,
        }
    }

    /// Same world and cache under different parameters. The traffic delay is
    /// part of every cached table, so a new delay gets a fresh cache.
    pub fn with_config(&self, config: SimConfig) -> Self {
        let cache = if config.traffic_delay == self.cache.traffic_delay() {
            Arc::clone(&self.cache)
        } else {
            Arc::new(PlanCache::new(Arc::clone(&self.map), config.traffic_delay, self.metrics.clone()))
        };
        Self {
            config: Arc::new(config),
            map: Arc::clone(&self.map),
            cache,
            metrics: self.metrics.clone(),
        }
    }
}

/// Runs episodes of one world.
pub struct Simulation {
    ctx: SimContext,
    pub metrics: MetricsCollector,
}

impl Simulation {
    pub fn new(map: GridMap, config: SimConfig) -> Self {
        let metrics = MetricsCollector::new();
        Self {
            ctx: SimContext::new(map, config, metrics.clone()),
            metrics,
        }
    }

    pub fn context(&self) -> &SimContext {
        &self.ctx
    }

    pub fn config(&self) -> &SimConfig {
        &self.ctx.config
    }

    pub fn run(&self, decisions: Option<Box<dyn DecisionSource>>) -> Result<EpisodeLog> {
        Episode::new(self.ctx.clone(), decisions).run()
    }

    /// One episode per seed, everything else as configured. Episodes run one after
    /// another; each parallelizes its own rollouts.
    pub fn run_batch(&self, seeds: &[u64]) -> Result<Vec<EpisodeLog>> {
        info!("Starting batch: {} ({} seeds)", self.ctx.config.name, seeds.len());

        let pb = ProgressBar::new(seeds.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.orange/yellow} {pos}/{len} episodes {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );

        let mut logs = Vec::with_capacity(seeds.len());
        for &seed in seeds {
            let config = SimConfig::clone(&self.ctx.config).with_seed(seed);
            let log = Episode::new(self.ctx.with_config(config), None).run()?;
            pb.inc(1);

            let snapshot = self.metrics.snapshot();
            pb.set_message(format!(
                "Handoffs: {} | Cache hits: {:.1}%",
                snapshot.handoffs,
                snapshot.cache_hit_rate * 100.0
            ));
            logs.push(log);
        }

        pb.finish_with_message("Batch complete");
        Ok(logs)
    }
}
