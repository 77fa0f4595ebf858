//! Epidemic spread on a small-world network of neighbourhoods, with an app that traces contacts
//! and sends people into quarantine.
//!
//! The population is split into neighbourhoods. Inside each neighbourhood people are connected
//! by a ring lattice that can be rewired into a small-world graph; every day a few ephemeral
//! contacts cross neighbourhood boundaries. Each person follows an SEIR course of disease and
//! meets one random contact per day. People who use the tracing app remember their recent
//! contacts with other app users, and when one of them is removed those contacts may be asked to
//! quarantine, which cuts them off from the network until they are released.
//!
//! Like other agent-based models built on a `Context`, all of a run's state lives in the
//! `Context` as data plugins:
//! * `people`: the population and each person's health and quarantine state
//! * `network`: the base and daily working contact networks
//! * `contact_tracing`: app users, their contact histories and the quarantine log
//! * `simulation`: the daily step, per-day statistics and the `Simulation` facade
//!
//! `runner` runs many independent simulations over a parameter sweep and `report` writes their
//! results.
pub mod contact_tracing;
pub mod context;
pub mod error;
pub mod global_properties;
pub mod hashing;
pub mod log;
pub mod network;
pub mod parameters;
pub mod people;
pub mod random;
pub mod report;
pub mod runner;
pub mod simulation;

pub use context::Context;
pub use error::TraceNetError;
pub use hashing::{HashMap, HashSet};
pub use parameters::{ParametersValues, ParametersValuesBuilder};
pub use people::{HealthCounts, HealthStatus, PersonId};
pub use report::{RunRecord, SimulationResults};
pub use simulation::Simulation;

// Re-exported for use in macros
pub use rand;
