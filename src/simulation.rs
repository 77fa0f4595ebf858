//! The daily step and the `Simulation` facade that owns one run.
//!
//! A day runs in a fixed order:
//! 1. ephemeral cross-neighbourhood contacts are added to the working network;
//! 2. every person, in ascending id order, advances one day and then meets one random
//!    neighbour in the working network; the contact is recorded in the app and, if exactly one
//!    of the two is infected and the other susceptible, the susceptible one is exposed;
//! 3. the day's health counts are appended to the statistics;
//! 4. the network is reverted to the base and quarantined people are masked out.
//!
//! Because people are processed one after another, someone handled early in the day can
//! already have changed state when a later person meets them.
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::contact_tracing::ContextContactTracingExt;
use crate::context::Context;
use crate::error::TraceNetError;
use crate::network::{AdjacencyMatrix, ContextNetworkExt};
use crate::parameters::{ContextParametersExt, ParametersValues};
use crate::people::{ContextPeopleExt, HealthCounts, HealthStatus, PersonId};
use crate::random::{sample_single_from_known_length, ContextRandomExt};
use crate::report::RunRecord;
use crate::{define_data_plugin, define_rng};

struct SimulationStatistics {
    daily_counts: Vec<HealthCounts>,
}

define_data_plugin!(
    StatisticsPlugin,
    SimulationStatistics,
    SimulationStatistics {
        daily_counts: Vec::new(),
    }
);

define_rng!(ContactChoiceRng);

pub trait ContextSimulationExt {
    /// Sets up a run: stores the parameters, seeds the random streams, creates the population
    /// and the base network, enrols app users and seeds the initial infections.
    ///
    /// # Errors
    /// Returns `TraceNetError::ConfigurationError` for invalid parameters.
    fn setup_simulation(&mut self, parameters: ParametersValues) -> Result<(), TraceNetError>;

    /// Starts `day`: sets the current day and adds the day's ephemeral contacts.
    fn start_day(&mut self, day: usize);

    /// Runs the rest of the current day: person updates and contacts, statistics and the
    /// network reset.
    fn finish_day(&mut self);

    /// Runs one whole day.
    fn run_day(&mut self, day: usize) {
        self.start_day(day);
        self.finish_day();
    }

    fn get_daily_counts(&self) -> &[HealthCounts];
}

impl ContextSimulationExt for Context {
    fn setup_simulation(&mut self, parameters: ParametersValues) -> Result<(), TraceNetError> {
        self.init_parameters(parameters)?;
        let parameters = self.get_parameters().clone();
        let seed = parameters.seed;
        self.init_random(seed);

        self.init_population(
            parameters.neighbourhood_count,
            parameters.residents_per_neighbourhood,
            parameters.careless_probability,
        );
        self.init_network()?;
        self.init_contact_tracing();
        let seeded = self.seed_infections(parameters.initial_infections());
        info!("seeded {} initial infections (seed {seed})", seeded.len());
        Ok(())
    }

    fn start_day(&mut self, day: usize) {
        self.set_current_day(day);
        self.make_ephemeral_contacts();
    }

    fn finish_day(&mut self) {
        let day = self.get_current_day();
        for i in 0..self.get_population() {
            let person_id = PersonId(i);
            if self.advance_person(person_id) == Some(HealthStatus::Removed) {
                self.on_removed(person_id);
            }

            let contacts = self.get_contacts(person_id);
            let Some(contact) = self.sample(ContactChoiceRng, |rng| {
                sample_single_from_known_length(rng, contacts.into_iter())
            }) else {
                continue;
            };

            self.record_contact(person_id, contact, day);
            self.record_contact(contact, person_id, day);

            match (
                self.get_health_status(person_id),
                self.get_health_status(contact),
            ) {
                (HealthStatus::Infected, HealthStatus::Susceptible) => {
                    self.infect_person(contact);
                }
                (HealthStatus::Susceptible, HealthStatus::Infected) => {
                    self.infect_person(person_id);
                }
                _ => {}
            }
        }

        let counts = self.count_health_statuses();
        debug!(
            "day {day}: S={} E={} I={} R={}",
            counts.susceptible, counts.exposed, counts.infected, counts.removed
        );
        self.get_data_container_mut(StatisticsPlugin)
            .daily_counts
            .push(counts);

        self.revert_network();
    }

    fn get_daily_counts(&self) -> &[HealthCounts] {
        self.get_data_container(StatisticsPlugin)
            .map(|data| data.daily_counts.as_slice())
            .unwrap_or_default()
    }
}

/// The working network and the infected people at a point in a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub day: usize,
    pub adjacency: Vec<Vec<bool>>,
    pub infected: Vec<PersonId>,
}

/// One simulation run.
pub struct Simulation {
    context: Context,
    snapshot_interval: Option<usize>,
    snapshots: Vec<NetworkSnapshot>,
}

impl Simulation {
    /// Validates `parameters` and sets up a run.
    ///
    /// # Errors
    /// Returns `TraceNetError::ConfigurationError` for invalid parameters. No day is run.
    pub fn new(parameters: ParametersValues) -> Result<Self, TraceNetError> {
        let mut context = Context::new();
        context.setup_simulation(parameters)?;
        Ok(Simulation {
            context,
            snapshot_interval: None,
            snapshots: Vec::new(),
        })
    }

    /// Captures a network snapshot, after the ephemeral contacts are made, on every day that is
    /// a multiple of `interval`.
    #[must_use]
    pub fn with_snapshot_interval(mut self, interval: usize) -> Self {
        self.snapshot_interval = (interval > 0).then_some(interval);
        self
    }

    pub fn run_day(&mut self, day: usize) {
        self.context.start_day(day);
        if self
            .snapshot_interval
            .is_some_and(|interval| day % interval == 0)
        {
            let snapshot = self.network_snapshot();
            self.snapshots.push(snapshot);
        }
        self.context.finish_day();
    }

    /// Runs the remaining days up to `max_days`.
    pub fn run(&mut self) {
        let max_days = self.context.get_parameters().max_days;
        for day in self.days_elapsed()..max_days {
            self.run_day(day);
        }
        let counts = self.context.count_health_statuses();
        info!(
            "run with seed {} finished after {max_days} days: {} removed, {} quarantines",
            self.context.get_parameters().seed,
            counts.removed,
            self.context.get_quarantine_log().len()
        );
    }

    #[must_use]
    pub fn days_elapsed(&self) -> usize {
        self.daily_counts().len()
    }

    #[must_use]
    pub fn daily_counts(&self) -> &[HealthCounts] {
        self.context.get_daily_counts()
    }

    #[must_use]
    pub fn quarantine_audit(&self) -> Vec<u8> {
        self.context.quarantine_audit()
    }

    #[must_use]
    pub fn adjacency_snapshot(&self) -> AdjacencyMatrix {
        self.context.get_network().working().clone()
    }

    #[must_use]
    pub fn infected_ids(&self) -> Vec<PersonId> {
        self.context.get_infected_ids()
    }

    #[must_use]
    pub fn network_snapshot(&self) -> NetworkSnapshot {
        let working = self.context.get_network().working();
        NetworkSnapshot {
            day: self.context.get_current_day(),
            adjacency: (0..working.size())
                .map(|i| working.row(i).to_vec())
                .collect(),
            infected: self.infected_ids(),
        }
    }

    #[must_use]
    pub fn snapshots(&self) -> &[NetworkSnapshot] {
        &self.snapshots
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// The per-run results kept in reports.
    #[must_use]
    pub fn record(&self) -> RunRecord {
        RunRecord {
            daily_counts: self.daily_counts().to_vec(),
            quarantine_audit: self.quarantine_audit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ParametersValuesBuilder;
    use crate::people::set_person_status;

    fn parameters() -> ParametersValuesBuilder {
        let mut builder = ParametersValuesBuilder::default();
        builder.max_days(60).seed(42);
        builder
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert!(matches!(
            Simulation::new(parameters().connection_degree(3).build().unwrap()),
            Err(TraceNetError::ConfigurationError(_))
        ));
        assert!(matches!(
            Simulation::new(parameters().app_usage_rate(1.2).build().unwrap()),
            Err(TraceNetError::ConfigurationError(_))
        ));
    }

    #[test]
    fn counts_are_conserved_each_day() {
        let mut simulation = Simulation::new(
            parameters()
                .rewire_probability(0.2)
                .initial_infection_rate(0.1)
                .build()
                .unwrap(),
        )
        .unwrap();
        simulation.run();
        assert_eq!(simulation.daily_counts().len(), 60);
        for counts in simulation.daily_counts() {
            assert_eq!(counts.total(), 30);
        }
    }

    #[test]
    fn removed_never_decreases() {
        let mut simulation = Simulation::new(
            parameters()
                .careless_probability(0.5)
                .initial_infection_rate(0.2)
                .build()
                .unwrap(),
        )
        .unwrap();
        simulation.run();
        let removed: Vec<usize> = simulation.daily_counts().iter().map(|c| c.removed).collect();
        assert!(removed.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn no_infection_stays_susceptible() {
        let mut simulation =
            Simulation::new(parameters().initial_infection_rate(0.0).build().unwrap()).unwrap();
        simulation.run();
        for counts in simulation.daily_counts() {
            assert_eq!(counts.susceptible, 30);
        }
        assert!(simulation.quarantine_audit().is_empty());
        assert!(simulation.infected_ids().is_empty());
    }

    #[test]
    fn same_seed_same_run() {
        let build = || {
            parameters()
                .rewire_probability(0.3)
                .initial_infection_rate(0.1)
                .ephemeral_contact_percentage(10.0)
                .build()
                .unwrap()
        };
        let mut first = Simulation::new(build()).unwrap();
        let mut second = Simulation::new(build()).unwrap();
        first.run();
        second.run();
        assert_eq!(first.record(), second.record());
        assert_eq!(first.adjacency_snapshot(), second.adjacency_snapshot());
    }

    #[test]
    fn working_network_is_base_minus_quarantined_after_each_day() {
        let mut simulation = Simulation::new(
            parameters()
                .app_usage_rate(1.0)
                .quarantine_probability(1.0)
                .initial_infection_rate(0.2)
                .ephemeral_contact_percentage(20.0)
                .build()
                .unwrap(),
        )
        .unwrap();
        for day in 0..40 {
            simulation.run_day(day);
            let context = simulation.context();
            let network = context.get_network();
            let working = simulation.adjacency_snapshot();
            assert!(working.is_symmetric());
            for (i, j) in working.edges() {
                assert_eq!(network.block_of(i), network.block_of(j));
                assert!(network.base().has_edge(i, j));
            }
            for person_id in context.get_quarantined_people() {
                assert_eq!(working.degree(person_id.0), 0);
            }
        }
    }

    #[test]
    fn quarantine_disabled_leaves_network_unmasked() {
        let mut simulation = Simulation::new(
            parameters()
                .include_quarantining(false)
                .initial_infection_rate(0.3)
                .build()
                .unwrap(),
        )
        .unwrap();
        simulation.run();
        assert!(simulation.quarantine_audit().is_empty());
        let network = simulation.context().get_network();
        assert_eq!(network.working(), network.base());
    }

    #[test]
    fn snapshots_every_interval() {
        let mut simulation = Simulation::new(
            parameters()
                .max_days(21)
                .initial_infection_rate(0.1)
                .build()
                .unwrap(),
        )
        .unwrap()
        .with_snapshot_interval(5);
        simulation.run();
        let days: Vec<usize> = simulation.snapshots().iter().map(|s| s.day).collect();
        assert_eq!(days, vec![0, 5, 10, 15, 20]);
        assert_eq!(simulation.snapshots()[0].adjacency.len(), 30);

        let snapshot = simulation.network_snapshot();
        assert_eq!(snapshot.day, 20);
        assert_eq!(snapshot.infected, simulation.infected_ids());
    }

    #[test]
    fn run_continues_from_elapsed_days() {
        let mut simulation = Simulation::new(parameters().max_days(10).build().unwrap()).unwrap();
        simulation.run_day(0);
        simulation.run_day(1);
        assert_eq!(simulation.days_elapsed(), 2);
        simulation.run();
        assert_eq!(simulation.days_elapsed(), 10);
    }

    fn triangle(seed: u64) -> Simulation {
        Simulation::new(
            parameters()
                .neighbourhood_count(1)
                .residents_per_neighbourhood(3)
                .connection_degree(2)
                .careless_probability(0.0)
                .ephemeral_contact_percentage(0.0)
                .include_quarantining(false)
                .initial_infection_rate(0.0)
                .seed(seed)
                .build()
                .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn oversized_configuration_is_an_error() {
        assert!(matches!(
            Simulation::new(
                parameters()
                    .neighbourhood_count(usize::MAX / 4)
                    .residents_per_neighbourhood(10)
                    .build()
                    .unwrap()
            ),
            Err(TraceNetError::ConfigurationError(_))
        ));
        assert!(matches!(
            Simulation::new(
                parameters()
                    .neighbourhood_count(1)
                    .residents_per_neighbourhood(200_000)
                    .build()
                    .unwrap()
            ),
            Err(TraceNetError::ConfigurationError(_))
        ));
    }

    #[test]
    fn person_removed_early_in_the_day_infects_nobody() {
        // Person 0 is certain to be removed by its own update, before anyone meets it.
        for seed in 0..50 {
            let mut simulation = triangle(seed);
            set_person_status(
                simulation.context_mut(),
                PersonId(0),
                HealthStatus::Infected,
                3,
            );
            simulation.run_day(0);
            assert_eq!(
                simulation.daily_counts()[0],
                HealthCounts {
                    susceptible: 2,
                    removed: 1,
                    ..HealthCounts::default()
                }
            );
        }
    }

    #[test]
    fn earlier_people_change_state_before_later_ones_meet_them() {
        // Becoming infected at the start of the day lets person 0 expose both others that day.
        let mut none_left_susceptible = 0;
        for seed in 0..100 {
            let mut simulation = triangle(seed);
            set_person_status(
                simulation.context_mut(),
                PersonId(0),
                HealthStatus::Exposed,
                3,
            );
            simulation.run_day(0);
            if simulation.daily_counts()[0].susceptible == 0 {
                none_left_susceptible += 1;
            }
        }
        assert!(none_left_susceptible > 0);

        // The last person only becomes infectious after everyone else has had their contact,
        // so at most its own contact can be exposed.
        for seed in 0..100 {
            let mut simulation = triangle(seed);
            set_person_status(
                simulation.context_mut(),
                PersonId(2),
                HealthStatus::Exposed,
                3,
            );
            simulation.run_day(0);
            let counts = simulation.daily_counts()[0];
            assert_eq!(counts.infected, 1);
            assert!(counts.exposed <= 1);
        }
    }
}
