pub mod logger;
pub mod analyzer;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use parking_lot::RwLock;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub elapsed_s: f64,
    pub episodes: u64,
    pub ticks: u64,
    pub plans_computed: u64,
    pub plan_cache_hits: u64,
    pub belief_refinements: u64,
    pub arbitrations: u64,
    pub handoffs: u64,
    pub rollouts: u64,
    pub rollouts_unfinished: u64,
    pub cache_hit_rate: f64,
}

/// Engine counters. Cheap to clone, shared with parallel rollouts.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    inner: Arc<RwLock<MetricsInner>>,
    start_time: Instant,
}

#[derive(Debug, Default)]
struct MetricsInner {
    episodes: u64,
    ticks: u64,
    plans_computed: u64,
    plan_cache_hits: u64,
    belief_refinements: u64,
    arbitrations: u64,
    handoffs: u64,
    rollouts: u64,
    rollouts_unfinished: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner::default())),
            start_time: Instant::now(),
        }
    }

    pub fn episode_finished(&self, ticks: u64) {
        let mut inner = self.inner.write();
        inner.episodes += 1;
        inner.ticks += ticks;
    }

    pub fn plan_computed(&self) {
        self.inner.write().plans_computed += 1;
    }

    pub fn plan_cache_hit(&self) {
        self.inner.write().plan_cache_hits += 1;
    }

    pub fn belief_refined(&self) {
        self.inner.write().belief_refinements += 1;
    }

    pub fn arbitration(&self, switched: bool) {
        let mut inner = self.inner.write();
        inner.arbitrations += 1;
        if switched {
            inner.handoffs += 1;
        }
    }

    pub fn rollouts(&self, total: u64, unfinished: u64) {
        let mut inner = self.inner.write();
        inner.rollouts += total;
        inner.rollouts_unfinished += unfinished;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read();

        let lookups = inner.plans_computed + inner.plan_cache_hits;
        let cache_hit_rate = if lookups > 0 {
            inner.plan_cache_hits as f64 / lookups as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            elapsed_s: self.start_time.elapsed().as_secs_f64(),
            episodes: inner.episodes,
            ticks: inner.ticks,
            plans_computed: inner.plans_computed,
            plan_cache_hits: inner.plan_cache_hits,
            belief_refinements: inner.belief_refinements,
            arbitrations: inner.arbitrations,
            handoffs: inner.handoffs,
            rollouts: inner.rollouts,
            rollouts_unfinished: inner.rollouts_unfinished,
            cache_hit_rate,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
