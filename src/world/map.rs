use super::{Cell, Direction, TrafficCell};
use crate::error::{Result, SimError};
use std::collections::HashSet;

/// Static road network with the ground-truth hazard layout.
///
/// The text form is one row per line with whitespace-separated tiles:
/// `-` road, `*` wall, `v` vehicle, `g` goal, `c` closure, `a` accident,
/// `t` clear traffic and `T` jammed traffic. Hazard tiles are roads.
#[derive(Debug, Clone, PartialEq)]
pub struct GridMap {
    rows: usize,
    cols: usize,
    roads: Vec<bool>,
    start: Cell,
    goal: Cell,
    closure: Option<Cell>,
    accident: Option<Cell>,
    traffic: Vec<TrafficCell>,
}

impl GridMap {
    pub fn from_parts(
        roads: Vec<Vec<bool>>,
        start: Cell,
        goal: Cell,
        closure: Option<Cell>,
        accident: Option<Cell>,
        traffic: Vec<TrafficCell>,
    ) -> Result<Self> {
        let rows = roads.len();
        let cols = roads.first().map(|r| r.len()).unwrap_or(0);
        if rows == 0 || cols == 0 {
            return Err(SimError::InvalidMap("map is empty".to_string()));
        }
        if roads.iter().any(|r| r.len() != cols) {
            return Err(SimError::InvalidMap("rows have different lengths".to_string()));
        }

        let map = Self {
            rows,
            cols,
            roads: roads.into_iter().flatten().collect(),
            start,
            goal,
            closure,
            accident,
            traffic,
        };
        map.validate()?;
        Ok(map)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut roads = Vec::new();
        let mut start = None;
        let mut goal = None;
        let mut closure = None;
        let mut accident = None;
        let mut traffic = Vec::new();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let row = roads.len() as i32;
            let mut tiles = Vec::new();
            for (col, tile) in line.split_whitespace().flat_map(str::chars).enumerate() {
                let cell = Cell::new(row, col as i32);
                let unique = |slot: &mut Option<Cell>, name: &str| -> Result<()> {
                    if slot.replace(cell).is_some() {
                        return Err(SimError::InvalidMap(format!("more than one {}", name)));
                    }
                    Ok(())
                };
                match tile {
                    '-' => {}
                    '*' => {
                        tiles.push(false);
                        continue;
                    }
                    'v' => unique(&mut start, "vehicle")?,
                    'g' => unique(&mut goal, "goal")?,
                    'c' => unique(&mut closure, "closure")?,
                    'a' => unique(&mut accident, "accident")?,
                    't' => traffic.push(TrafficCell { cell, jammed: false }),
                    'T' => traffic.push(TrafficCell { cell, jammed: true }),
                    other => {
                        return Err(SimError::InvalidMap(format!("unknown tile {:?} at {}", other, cell)));
                    }
                }
                tiles.push(true);
            }
            roads.push(tiles);
        }

        let start = start.ok_or_else(|| SimError::InvalidMap("no vehicle".to_string()))?;
        let goal = goal.ok_or_else(|| SimError::InvalidMap("no goal".to_string()))?;
        Self::from_parts(roads, start, goal, closure, accident, traffic)
    }

    fn validate(&self) -> Result<()> {
        let mut special = vec![("vehicle", self.start), ("goal", self.goal)];
        special.extend(self.closure.map(|c| ("closure", c)));
        special.extend(self.accident.map(|c| ("accident", c)));
        special.extend(self.traffic.iter().map(|t| ("traffic", t.cell)));

        let mut seen = HashSet::new();
        for (name, cell) in special {
            if !self.is_road(cell) {
                return Err(SimError::InvalidMap(format!("{} at {} is not a road", name, cell)));
            }
            if !seen.insert(cell) {
                return Err(SimError::InvalidMap(format!("{} at {} overlaps another feature", name, cell)));
            }
        }
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn start(&self) -> Cell {
        self.start
    }

    pub fn goal(&self) -> Cell {
        self.goal
    }

    pub fn closure(&self) -> Option<Cell> {
        self.closure
    }

    pub fn accident(&self) -> Option<Cell> {
        self.accident
    }

    pub fn traffic(&self) -> &[TrafficCell] {
        &self.traffic
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.row >= 0 && cell.col >= 0 && (cell.row as usize) < self.rows && (cell.col as usize) < self.cols
    }

    /// Flat row-major index, `None` outside the grid.
    pub fn index(&self, cell: Cell) -> Option<usize> {
        self.contains(cell).then(|| cell.row as usize * self.cols + cell.col as usize)
    }

    pub fn is_road(&self, cell: Cell) -> bool {
        self.index(cell).map(|i| self.roads[i]).unwrap_or(false)
    }

    /// Roads adjacent to `cell` that are not blocked by the given closure or accident.
    pub fn open_neighbors(
        &self,
        cell: Cell,
        closure: Option<Cell>,
        accident: Option<Cell>,
    ) -> impl Iterator<Item = (Direction, Cell)> + '_ {
        Direction::ALL.into_iter().filter_map(move |direction| {
            let next = cell.step(direction);
            let blocked = Some(next) == closure || Some(next) == accident;
            (self.is_road(next) && !blocked).then_some((direction, next))
        })
    }

    pub fn road_cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.rows).flat_map(move |r| {
            (0..self.cols)
                .map(move |c| Cell::new(r as i32, c as i32))
                .filter(|cell| self.is_road(*cell))
        })
    }

    /// 0 for road, 1 for wall, row-major. Used by log headers.
    pub fn wall_matrix(&self) -> Vec<Vec<u8>> {
        self.roads
            .chunks(self.cols)
            .map(|row| row.iter().map(|&road| u8::from(!road)).collect())
            .collect()
    }
}
