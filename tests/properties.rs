use codrive::belief::round_probability;
use codrive::metrics::MetricsCollector;
use codrive::models::{ObservationModel, Visibility};
use codrive::planner::{JamLevel, plan};
use codrive::prelude::*;
use codrive::world::TrafficCell;
use proptest::prelude::*;
use std::sync::Arc;

const ROWS: usize = 4;
const COLS: usize = 5;

/// Tile codes: 0..=2 road, 3 wall, 4 clear traffic, 5 jammed traffic.
/// The corners hold the vehicle and the goal and are always plain road.
fn build_map(tiles: &[u8]) -> GridMap {
    let start = Cell::new(ROWS as i32 - 1, 0);
    let goal = Cell::new(0, COLS as i32 - 1);
    let mut roads = vec![vec![true; COLS]; ROWS];
    let mut traffic = Vec::new();

    for (i, &tile) in tiles.iter().enumerate() {
        let cell = Cell::new((i / COLS) as i32, (i % COLS) as i32);
        if cell == start || cell == goal {
            continue;
        }
        match tile {
            3 => roads[i / COLS][i % COLS] = false,
            4 => traffic.push(TrafficCell { cell, jammed: false }),
            5 => traffic.push(TrafficCell { cell, jammed: true }),
            _ => {}
        }
    }
    GridMap::from_parts(roads, start, goal, None, None, traffic).unwrap()
}

fn true_key(map: &GridMap) -> HazardKey {
    HazardKey::new(None, None, map.traffic().iter().map(|t| JamLevel::from_jammed(t.jammed)))
}

proptest! {
    #[test]
    fn cost_to_go_satisfies_bellman(tiles in prop::collection::vec(0u8..6, ROWS * COLS), delay in 0u32..15) {
        let map = build_map(&tiles);
        let table = plan(&map, &true_key(&map), delay);
        prop_assert_eq!(table.raw(map.goal()), Some(0));

        for cell in map.road_cells() {
            let best = map
                .open_neighbors(cell, None, None)
                .filter_map(|(_, next)| table.raw(next).map(|c| c + table.entry_cost(next)))
                .min();
            if cell == map.goal() {
                continue;
            }
            // unreachable cells have no reachable neighbors either
            prop_assert_eq!(table.raw(cell), best);
        }
    }

    #[test]
    fn planning_is_pure(tiles in prop::collection::vec(0u8..6, ROWS * COLS), delay in 0u32..15) {
        let map = build_map(&tiles);
        let key = true_key(&map);
        prop_assert_eq!(plan(&map, &key, delay), plan(&map, &key, delay));
    }

    #[test]
    fn posteriors_stay_valid(
        p in prop::collection::vec(prop_oneof![Just(0.0), Just(1.0), 0.0f64..=1.0], 2),
        direction in prop::sample::select(Direction::ALL.to_vec()),
    ) {
        let map = Arc::new(GridMap::parse("- - g\nt * t\nv - -").unwrap());
        let cache = PlanCache::new(map.clone(), 10, MetricsCollector::new());
        let state = WorldState::initial(&map, Driver::Ai);
        let belief = Belief::initial_human(&state).with_traffic(p);

        let refined = BeliefFilter::new(1.0).refine(&cache, &belief, None, direction);
        for (before, after) in belief.traffic().iter().zip(refined.traffic()) {
            prop_assert!((0.0..=1.0).contains(after));
            prop_assert_eq!(*after, round_probability(*after));
            if *before == 0.0 || *before == 1.0 {
                prop_assert_eq!(before, after);
            }
        }
    }

    #[test]
    fn revealed_hazards_are_monotone(path in prop::collection::vec((0i32..5, 0i32..5), 1..12)) {
        let map = GridMap::parse("
            - - - - g
            - t - c -
            - - - - -
            - a - T -
            v - - - -
        ").unwrap();
        let eyes = [Visibility::new(Driver::Ai, 1), Visibility::new(Driver::Human, 1)];
        let mut state = WorldState::initial(&map, Driver::Ai);
        let mut beliefs = [Belief::initial_ai(&state), Belief::initial_human(&state)];

        for (row, col) in path {
            state.vehicle = Cell::new(row, col);
            for (belief, sensor) in beliefs.iter_mut().zip(&eyes) {
                let next = belief.revise(&state, &sensor.observe(&map, &state));
                if belief.closure().is_some() {
                    prop_assert_eq!(next.closure(), belief.closure());
                }
                if belief.accident().is_some() {
                    prop_assert_eq!(next.accident(), belief.accident());
                }
                for (before, after) in belief.traffic().iter().zip(next.traffic()) {
                    if *before == 0.0 || *before == 1.0 {
                        prop_assert_eq!(before, after);
                    }
                }
                *belief = next;
            }
        }
    }
}
