use super::ObservationModel;
use crate::world::{Cell, Driver, GridMap, WorldState};
use serde::{Deserialize, Serialize};

/// Hazards as seen by one agent. `None` entries are not perceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub closure: Option<Cell>,
    pub accident: Option<Cell>,
    pub traffic: Vec<Option<bool>>,
}

/// Square field of vision around the vehicle, plus the information each agent
/// has regardless of position: the AI's sensor network reports every traffic
/// cell and the human's local knowledge covers the road closure. Accidents are
/// only ever seen up close.
#[derive(Debug, Clone, Copy)]
pub struct Visibility {
    radius: i32,
    driver: Driver,
}

impl Visibility {
    pub fn new(driver: Driver, radius: u32) -> Self {
        Self {
            radius: radius as i32,
            driver,
        }
    }

    pub fn in_view(&self, vehicle: Cell, cell: Cell) -> bool {
        cell.within(vehicle, self.radius)
    }

    /// In-bounds cells of the window, row-major.
    pub fn field_of_vision(&self, map: &GridMap, vehicle: Cell) -> Vec<Cell> {
        let r = self.radius;
        (vehicle.row - r..=vehicle.row + r)
            .flat_map(|row| (vehicle.col - r..=vehicle.col + r).map(move |col| Cell::new(row, col)))
            .filter(|cell| map.contains(*cell))
            .collect()
    }
}

impl ObservationModel for Visibility {
    fn observe(&self, _map: &GridMap, state: &WorldState) -> Observation {
        let vehicle = state.vehicle;

        let closure = state
            .closure
            .filter(|&c| self.driver == Driver::Human || self.in_view(vehicle, c));
        let accident = state.accident.filter(|&c| self.in_view(vehicle, c));
        let traffic = state
            .traffic
            .iter()
            .map(|t| (self.driver == Driver::Ai || self.in_view(vehicle, t.cell)).then_some(t.jammed))
            .collect();

        Observation {
            closure,
            accident,
            traffic,
        }
    }

    fn name(&self) -> &str {
        match self.driver {
            Driver::Ai => "ai-sensors",
            Driver::Human => "human-eyes",
        }
    }
}
