pub mod error;
pub mod world;
pub mod models;
pub mod planner;
pub mod belief;
pub mod agent;
pub mod arbitration;
pub mod metrics;
pub mod simulation;

pub use agent::Agent;
pub use error::{Result, SimError};
pub use simulation::{Simulation, SimConfig};
pub use metrics::MetricsCollector;

pub mod prelude {
    pub use crate::agent::Agent;
    pub use crate::arbitration::{ArbitrationRecord, Arbitrator, HandoffScores};
    pub use crate::belief::{Belief, BeliefFilter};
    pub use crate::error::{Result, SimError};
    pub use crate::metrics::MetricsSnapshot;
    pub use crate::planner::{CostToGo, HazardKey, PlanCache};
    pub use crate::simulation::{
        DecisionSource, Episode, EpisodeLog, EpisodeOutcome, ResponseScript, ScriptedDecisions, SimConfig, SimContext,
        Simulation,
    };
    pub use crate::world::{Action, Cell, Direction, Driver, GridMap, WorldState};
}
