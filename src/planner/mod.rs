pub mod cache;

pub use cache::PlanCache;

use crate::world::{Cell, Direction, GridMap};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Fixed-point scale shared by costs and jam levels: one unit of cost, or
/// probability 1.0, is `COST_SCALE`.
pub const COST_SCALE: u64 = 100_000;

/// Jam probability of one traffic cell, quantized to five decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JamLevel(u32);

impl JamLevel {
    pub const CLEAR: JamLevel = JamLevel(0);
    pub const JAMMED: JamLevel = JamLevel(COST_SCALE as u32);

    pub fn from_probability(p: f64) -> Self {
        JamLevel((p.clamp(0.0, 1.0) * COST_SCALE as f64).round() as u32)
    }

    pub fn from_jammed(jammed: bool) -> Self {
        if jammed { Self::JAMMED } else { Self::CLEAR }
    }

    pub fn probability(self) -> f64 {
        self.0 as f64 / COST_SCALE as f64
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// One concrete hazard hypothesis: the planner input and the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HazardKey {
    pub closure: Option<Cell>,
    pub accident: Option<Cell>,
    /// Aligned with `GridMap::traffic()`.
    pub traffic: Box<[JamLevel]>,
}

impl HazardKey {
    pub fn new(closure: Option<Cell>, accident: Option<Cell>, traffic: impl IntoIterator<Item = JamLevel>) -> Self {
        Self {
            closure,
            accident,
            traffic: traffic.into_iter().collect(),
        }
    }
}

/// A direction the vehicle can take and what it costs to reach the goal that way.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionLogit {
    pub direction: Direction,
    pub cost: f64,
}

/// Cost-to-go for every cell connected to the goal under one hypothesis.
/// Cells missing from the table have no feasible path.
#[derive(Debug, Clone, PartialEq)]
pub struct CostToGo {
    key: HazardKey,
    costs: HashMap<Cell, u64>,
    penalties: HashMap<Cell, u64>,
}

impl CostToGo {
    pub fn key(&self) -> &HazardKey {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }

    pub fn raw(&self, cell: Cell) -> Option<u64> {
        self.costs.get(&cell).copied()
    }

    pub fn get(&self, cell: Cell) -> Option<f64> {
        self.raw(cell).map(to_units)
    }

    /// Cost of entering `cell`: the move itself plus the expected jam delay there.
    pub fn entry_cost(&self, cell: Cell) -> u64 {
        COST_SCALE + self.penalties.get(&cell).copied().unwrap_or(0)
    }

    /// Total cost of stepping into `cell` and continuing optimally from there.
    pub fn cost_via(&self, cell: Cell) -> Option<f64> {
        self.raw(cell).map(|c| to_units(c + self.entry_cost(cell)))
    }

    /// Logits for every legal move out of `from`, with the hypothesis' own closure
    /// and accident as blockers. `None` when `from` cannot reach the goal.
    pub fn logits(&self, map: &GridMap, from: Cell) -> Option<Vec<ActionLogit>> {
        self.raw(from)?;
        let logits = map
            .open_neighbors(from, self.key.closure, self.key.accident)
            .filter_map(|(direction, next)| {
                self.cost_via(next).map(|cost| ActionLogit { direction, cost })
            })
            .collect();
        Some(logits)
    }
}

fn to_units(raw: u64) -> f64 {
    raw as f64 / COST_SCALE as f64
}

/// Backward Dijkstra from the goal. Closure and accident cells are not part of the
/// graph; entering a traffic cell costs `traffic_delay` times its jam level on top
/// of the unit move.
pub fn plan(map: &GridMap, key: &HazardKey, traffic_delay: u32) -> CostToGo {
    let penalties: HashMap<Cell, u64> = map
        .traffic()
        .iter()
        .zip(key.traffic.iter())
        .filter(|(_, level)| level.raw() > 0)
        .map(|(t, level)| (t.cell, traffic_delay as u64 * level.raw() as u64))
        .collect();
    let entry_cost = |cell: Cell| COST_SCALE + penalties.get(&cell).copied().unwrap_or(0);

    let goal = map.goal();
    let mut costs = HashMap::new();
    costs.insert(goal, 0u64);

    // (cost, insertion counter, cell): the counter makes tie-breaking follow insertion order
    let mut heap = BinaryHeap::new();
    let mut counter = 0u64;
    heap.push(Reverse((0u64, counter, goal)));

    while let Some(Reverse((cost, _, cell))) = heap.pop() {
        if costs.get(&cell).is_some_and(|&best| cost > best) {
            continue;
        }
        let through = cost + entry_cost(cell);
        for (_, prev) in map.open_neighbors(cell, key.closure, key.accident) {
            if costs.get(&prev).is_none_or(|&best| through < best) {
                costs.insert(prev, through);
                counter += 1;
                heap.push(Reverse((through, counter, prev)));
            }
        }
    }

    CostToGo {
        key: key.clone(),
        costs,
        penalties,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_for(map: &GridMap, jams: &[bool]) -> HazardKey {
        HazardKey::new(map.closure(), map.accident(), jams.iter().map(|&j| JamLevel::from_jammed(j)))
    }

    #[test]
    fn open_grid_counts_moves() {
        let map = GridMap::parse("- - g\n- - -\nv - -").unwrap();
        let table = plan(&map, &key_for(&map, &[]), 10);
        assert_eq!(table.get(Cell::new(0, 2)), Some(0.0));
        assert_eq!(table.get(Cell::new(2, 0)), Some(4.0));
        assert_eq!(table.len(), 9);
    }

    #[test]
    fn closure_and_accident_are_removed_from_the_graph() {
        // the only corridor is closed, so nothing but the goal row reaches the goal
        let map = GridMap::parse("- - g\nc * *\nv - -").unwrap();
        let table = plan(&map, &key_for(&map, &[]), 10);
        assert_eq!(table.get(Cell::new(2, 0)), None);
        assert_eq!(table.get(Cell::new(1, 0)), None);
        assert_eq!(table.get(Cell::new(0, 0)), Some(2.0));
        assert!(table.logits(&map, Cell::new(2, 0)).is_none());
    }

    #[test]
    fn expected_jam_delay_scales_with_probability() {
        let map = GridMap::parse("* - g\n* t *\nv - *").unwrap();
        let half = HazardKey::new(None, None, [JamLevel::from_probability(0.5)]);
        let table = plan(&map, &half, 10);
        assert_eq!(table.get(Cell::new(2, 0)), Some(9.0));
    }

    #[test]
    fn jam_levels_quantize_to_five_decimals() {
        assert_eq!(JamLevel::from_probability(0.123456), JamLevel::from_probability(0.12346));
        assert_eq!(JamLevel::from_probability(1.0), JamLevel::JAMMED);
        assert_eq!(JamLevel::from_probability(0.0), JamLevel::CLEAR);
    }
}
