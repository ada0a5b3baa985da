pub mod map;
pub mod state;

pub use map::GridMap;
pub use state::{TrafficCell, WorldState};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub row: i32,
    pub col: i32,
}

impl Cell {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    pub fn step(self, direction: Direction) -> Cell {
        let (dr, dc) = direction.offset();
        Cell::new(self.row + dr, self.col + dc)
    }

    /// Chebyshev window test used by the field of vision.
    pub fn within(self, center: Cell, radius: i32) -> bool {
        (self.row - center.row).abs() <= radius && (self.col - center.col).abs() <= radius
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Right,
    Left,
    Up,
    Down,
}

impl Direction {
    /// Enumeration order for neighbors and logits. The optimal policy breaks ties by it.
    pub const ALL: [Direction; 4] = [Direction::Right, Direction::Left, Direction::Up, Direction::Down];

    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::Right => (0, 1),
            Direction::Left => (0, -1),
            Direction::Up => (-1, 0),
            Direction::Down => (1, 0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Right => "right",
            Direction::Left => "left",
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "right" => Ok(Direction::Right),
            "left" => Ok(Direction::Left),
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

/// Marker appended to a direction token when the driver asks to hand over control.
pub const SWITCH_MARKER: char = '?';

/// A direction, optionally carrying a propose-switch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Action {
    pub direction: Direction,
    pub propose_switch: bool,
}

impl Action {
    pub fn plain(direction: Direction) -> Self {
        Self { direction, propose_switch: false }
    }

    pub fn proposing(direction: Direction) -> Self {
        Self { direction, propose_switch: true }
    }

    pub fn stripped(self) -> Self {
        Self::plain(self.direction)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.propose_switch {
            write!(f, "{}{}", self.direction, SWITCH_MARKER)
        } else {
            write!(f, "{}", self.direction)
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_suffix(SWITCH_MARKER) {
            Some(base) => Ok(Action::proposing(base.parse()?)),
            None => Ok(Action::plain(s.parse()?)),
        }
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        token.parse().map_err(serde::de::Error::custom)
    }
}

/// Who holds the wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Human,
    Ai,
}

impl Driver {
    pub fn other(self) -> Driver {
        match self {
            Driver::Human => Driver::Ai,
            Driver::Ai => Driver::Human,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Driver::Human => "human",
            Driver::Ai => "ai",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Driver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Driver::Human),
            "ai" => Ok(Driver::Ai),
            other => Err(format!("unknown driver: {}", other)),
        }
    }
}
