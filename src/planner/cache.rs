use super::{CostToGo, HazardKey, plan};
use crate::metrics::MetricsCollector;
use crate::world::GridMap;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::trace;

/// Cost-to-go tables keyed by hypothesis, shared by an episode and all of its
/// rollouts. Tables are pure functions of the key, so a race between two threads
/// planning the same key only wastes work.
#[derive(Debug)]
pub struct PlanCache {
    map: Arc<GridMap>,
    traffic_delay: u32,
    tables: DashMap<HazardKey, Arc<CostToGo>>,
    metrics: MetricsCollector,
}

impl PlanCache {
    pub fn new(map: Arc<GridMap>, traffic_delay: u32, metrics: MetricsCollector) -> Self {
        Self {
            map,
            traffic_delay,
            tables: DashMap::new(),
            metrics,
        }
    }

    pub fn map(&self) -> &GridMap {
        &self.map
    }

    pub fn traffic_delay(&self) -> u32 {
        self.traffic_delay
    }

    pub fn get(&self, key: &HazardKey) -> Arc<CostToGo> {
        if let Some(table) = self.tables.get(key) {
            self.metrics.plan_cache_hit();
            return Arc::clone(table.value());
        }

        // planned outside the shard lock
        let table = Arc::new(plan(&self.map, key, self.traffic_delay));
        self.metrics.plan_computed();
        trace!("Planned hypothesis {:?}: {} reachable cells", key.traffic, table.len());

        Arc::clone(self.tables.entry(key.clone()).or_insert(table).value())
    }

    /// Like [`get`](Self::get), but a miss is planned without being stored.
    pub fn get_transient(&self, key: &HazardKey) -> Arc<CostToGo> {
        if let Some(table) = self.tables.get(key) {
            self.metrics.plan_cache_hit();
            return Arc::clone(table.value());
        }
        self.metrics.plan_computed();
        Arc::new(plan(&self.map, key, self.traffic_delay))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::JamLevel;

    #[test]
    fn repeated_keys_reuse_the_same_table() {
        let map = Arc::new(GridMap::parse("- t g\n- - -\nv - -").unwrap());
        let metrics = MetricsCollector::new();
        let cache = PlanCache::new(map, 10, metrics.clone());

        let clear = HazardKey::new(None, None, [JamLevel::CLEAR]);
        let jammed = HazardKey::new(None, None, [JamLevel::JAMMED]);

        let a = cache.get(&clear);
        let b = cache.get(&clear);
        let c = cache.get(&jammed);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.plans_computed, 2);
        assert_eq!(snapshot.plan_cache_hits, 1);
    }

    #[test]
    fn transient_lookups_do_not_grow_the_cache() {
        let map = Arc::new(GridMap::parse("- t g\n- - -\nv - -").unwrap());
        let cache = PlanCache::new(map, 10, MetricsCollector::new());
        let clear = HazardKey::new(None, None, [JamLevel::CLEAR]);
        let jammed = HazardKey::new(None, None, [JamLevel::JAMMED]);

        let stored = cache.get(&clear);
        assert!(Arc::ptr_eq(&stored, &cache.get_transient(&clear)));
        assert_eq!(*cache.get_transient(&jammed), plan(cache.map(), &jammed, 10));
        assert_eq!(cache.len(), 1);
    }
}
