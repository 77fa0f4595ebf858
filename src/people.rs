//! People and the neighbourhoods they live in.
//!
//! Each `Person` carries an SEIR health state together with an independent quarantine flag.
//! Health progresses once per day through `Person::advance`; a susceptible person becomes
//! exposed only through `Person::infect` after contact with an infected person. Removed is
//! absorbing.
//!
//! The population plugin stores every person in one vector indexed by `PersonId`; neighbourhoods
//! are contiguous ranges of that vector, which is what the network module uses as block
//! boundaries.
use std::fmt;
use std::ops::Range;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::context::Context;
use crate::rand::Rng;
use crate::random::{sample_multiple_from_known_length, ContextRandomExt};
use crate::{define_data_plugin, define_rng};

/// Probability that a careless person is exposed by a single contact with an infected person.
pub const CARELESS_INFECTION_PROBABILITY: f64 = 0.8;
/// Probability that any other person is exposed by a single contact with an infected person.
pub const INFECTION_PROBABILITY: f64 = 0.45;
/// Quarantine ends automatically after this many days.
pub const QUARANTINE_DAYS: u32 = 8;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PersonId(pub usize);

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
pub enum HealthStatus {
    Susceptible,
    Exposed,
    Infected,
    Removed,
}

/// Daily probability of leaving the exposed or infected state after `days` days in it,
/// `exp(2 * (days - 3.2))` clamped to `[0, 1]`.
#[must_use]
pub fn progression_probability(days: u32) -> f64 {
    (2.0 * (f64::from(days) - 3.2)).exp().clamp(0.0, 1.0)
}

#[derive(Clone, Debug)]
pub struct Person {
    id: PersonId,
    name: String,
    health_status: HealthStatus,
    days_in_status: u32,
    careless: bool,
    quarantined: bool,
    quarantine_days: u32,
}

impl Person {
    #[must_use]
    pub fn new(id: PersonId, name: String, careless: bool) -> Self {
        Person {
            id,
            name,
            health_status: HealthStatus::Susceptible,
            days_in_status: 0,
            careless,
            quarantined: false,
            quarantine_days: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> PersonId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn health_status(&self) -> HealthStatus {
        self.health_status
    }

    #[must_use]
    pub fn days_in_status(&self) -> u32 {
        self.days_in_status
    }

    #[must_use]
    pub fn is_careless(&self) -> bool {
        self.careless
    }

    #[must_use]
    pub fn is_quarantined(&self) -> bool {
        self.quarantined
    }

    #[must_use]
    pub fn quarantine_days(&self) -> u32 {
        self.quarantine_days
    }

    fn set_health_status(&mut self, health_status: HealthStatus) {
        self.health_status = health_status;
        self.days_in_status = 0;
    }

    /// Advances this person by one day. Returns the new health status if it changed.
    ///
    /// On the transition to `Removed` the quarantine flag is cleared; notifying the tracing
    /// app is the caller's job.
    pub fn advance<R: Rng>(&mut self, rng: &mut R) -> Option<HealthStatus> {
        let next = match self.health_status {
            HealthStatus::Exposed => Some(HealthStatus::Infected),
            HealthStatus::Infected => Some(HealthStatus::Removed),
            HealthStatus::Susceptible | HealthStatus::Removed => None,
        };

        let mut transition = None;
        if let Some(next) = next {
            self.days_in_status += 1;
            if rng.random_bool(progression_probability(self.days_in_status)) {
                self.set_health_status(next);
                if next == HealthStatus::Removed {
                    self.release_from_quarantine();
                }
                transition = Some(next);
            }
        }

        if self.quarantined {
            self.quarantine_days += 1;
            if self.quarantine_days >= QUARANTINE_DAYS {
                self.release_from_quarantine();
            }
        }

        transition
    }

    /// One exposure attempt. Only a susceptible person can be exposed; for anyone else this is
    /// a no-op. Returns true if the person became exposed.
    pub fn infect<R: Rng>(&mut self, rng: &mut R) -> bool {
        if self.health_status != HealthStatus::Susceptible {
            return false;
        }
        let probability = if self.careless {
            CARELESS_INFECTION_PROBABILITY
        } else {
            INFECTION_PROBABILITY
        };
        if rng.random_bool(probability) {
            self.set_health_status(HealthStatus::Exposed);
            return true;
        }
        false
    }

    /// Puts this person in quarantine. Returns false if they already were.
    pub fn quarantine(&mut self) -> bool {
        if self.quarantined {
            return false;
        }
        self.quarantined = true;
        self.quarantine_days = 0;
        true
    }

    fn release_from_quarantine(&mut self) {
        self.quarantined = false;
        self.quarantine_days = 0;
    }
}

/// A block of consecutive people in the population.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Neighbourhood {
    pub name: String,
    pub residents: Range<usize>,
}

impl Neighbourhood {
    #[must_use]
    pub fn len(&self) -> usize {
        self.residents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.residents.is_empty()
    }

    #[must_use]
    pub fn contains(&self, person_id: PersonId) -> bool {
        self.residents.contains(&person_id.0)
    }
}

/// Number of people in each health state on a given day.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCounts {
    pub susceptible: usize,
    pub exposed: usize,
    pub infected: usize,
    pub removed: usize,
}

impl HealthCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.susceptible + self.exposed + self.infected + self.removed
    }

    #[must_use]
    pub fn get(&self, health_status: HealthStatus) -> usize {
        match health_status {
            HealthStatus::Susceptible => self.susceptible,
            HealthStatus::Exposed => self.exposed,
            HealthStatus::Infected => self.infected,
            HealthStatus::Removed => self.removed,
        }
    }

    fn increment(&mut self, health_status: HealthStatus) {
        match health_status {
            HealthStatus::Susceptible => self.susceptible += 1,
            HealthStatus::Exposed => self.exposed += 1,
            HealthStatus::Infected => self.infected += 1,
            HealthStatus::Removed => self.removed += 1,
        }
    }
}

struct PeopleData {
    people: Vec<Person>,
    neighbourhoods: Vec<Neighbourhood>,
}

define_data_plugin!(
    PeoplePlugin,
    PeopleData,
    PeopleData {
        people: Vec::new(),
        neighbourhoods: Vec::new(),
    }
);

define_rng!(PopulationRng);
define_rng!(InfectionRng);
define_rng!(ProgressionRng);

pub trait ContextPeopleExt {
    /// Creates `neighbourhood_count` neighbourhoods of `residents_per_neighbourhood` people.
    /// Each person is careless with probability `careless_probability`.
    fn init_population(
        &mut self,
        neighbourhood_count: usize,
        residents_per_neighbourhood: usize,
        careless_probability: f64,
    );

    fn get_population(&self) -> usize;

    fn get_neighbourhoods(&self) -> &[Neighbourhood];

    /// # Panics
    /// Panics if `person_id` is not part of the population.
    fn get_person(&self, person_id: PersonId) -> &Person;

    fn get_people(&self) -> &[Person];

    fn get_health_status(&self, person_id: PersonId) -> HealthStatus;

    fn is_quarantined(&self, person_id: PersonId) -> bool;

    fn get_quarantined_people(&self) -> Vec<PersonId>;

    /// Sets a person straight to the infected state, bypassing exposure. Used to seed a run.
    fn seed_infection(&mut self, person_id: PersonId);

    /// Seeds `count` infections among people chosen uniformly without replacement.
    fn seed_infections(&mut self, count: usize) -> Vec<PersonId>;

    /// One exposure attempt on `person_id`; see `Person::infect`.
    fn infect_person(&mut self, person_id: PersonId) -> bool;

    /// Advances `person_id` by one day; see `Person::advance`.
    fn advance_person(&mut self, person_id: PersonId) -> Option<HealthStatus>;

    /// Quarantines `person_id`. Returns false if they already were.
    fn quarantine_person(&mut self, person_id: PersonId) -> bool;

    fn count_health_statuses(&self) -> HealthCounts;

    fn get_infected_ids(&self) -> Vec<PersonId>;
}

fn people_data(context: &Context) -> &PeopleData {
    context
        .get_data_container(PeoplePlugin)
        .expect("Population must be initialized with init_population")
}

/// Runs `f` with the person taken out of the population so that it can draw random numbers
/// from `context` while being mutated.
fn with_person_mut<T>(
    context: &mut Context,
    person_id: PersonId,
    f: impl FnOnce(&Context, &mut Person) -> T,
) -> T {
    let mut people = std::mem::take(&mut context.get_data_container_mut(PeoplePlugin).people);
    let result = f(&*context, &mut people[person_id.0]);
    context.get_data_container_mut(PeoplePlugin).people = people;
    result
}

/// Puts a person in `health_status` as if they had already spent `days_in_status` days in it.
#[cfg(test)]
pub(crate) fn set_person_status(
    context: &mut Context,
    person_id: PersonId,
    health_status: HealthStatus,
    days_in_status: u32,
) {
    let person = &mut context.get_data_container_mut(PeoplePlugin).people[person_id.0];
    person.set_health_status(health_status);
    person.days_in_status = days_in_status;
}

impl ContextPeopleExt for Context {
    fn init_population(
        &mut self,
        neighbourhood_count: usize,
        residents_per_neighbourhood: usize,
        careless_probability: f64,
    ) {
        let mut people = Vec::with_capacity(neighbourhood_count * residents_per_neighbourhood);
        let mut neighbourhoods = Vec::with_capacity(neighbourhood_count);
        for n in 0..neighbourhood_count {
            let neighbourhood_name = format!("Neighbourhood {}", n + 1);
            let start = people.len();
            for r in 0..residents_per_neighbourhood {
                let careless = self.sample_bool(PopulationRng, careless_probability);
                let id = PersonId(people.len());
                people.push(Person::new(
                    id,
                    format!("Person {} in {}", r + 1, neighbourhood_name),
                    careless,
                ));
            }
            neighbourhoods.push(Neighbourhood {
                name: neighbourhood_name,
                residents: start..people.len(),
            });
        }

        let careless_count = people.iter().filter(|p| p.is_careless()).count();
        info!(
            "created {} people in {} neighbourhoods ({} careless)",
            people.len(),
            neighbourhoods.len(),
            careless_count
        );

        let data_container = self.get_data_container_mut(PeoplePlugin);
        data_container.people = people;
        data_container.neighbourhoods = neighbourhoods;
    }

    fn get_population(&self) -> usize {
        self.get_data_container(PeoplePlugin)
            .map_or(0, |data| data.people.len())
    }

    fn get_neighbourhoods(&self) -> &[Neighbourhood] {
        &people_data(self).neighbourhoods
    }

    fn get_person(&self, person_id: PersonId) -> &Person {
        &people_data(self).people[person_id.0]
    }

    fn get_people(&self) -> &[Person] {
        &people_data(self).people
    }

    fn get_health_status(&self, person_id: PersonId) -> HealthStatus {
        self.get_person(person_id).health_status()
    }

    fn is_quarantined(&self, person_id: PersonId) -> bool {
        self.get_person(person_id).is_quarantined()
    }

    fn get_quarantined_people(&self) -> Vec<PersonId> {
        self.get_people()
            .iter()
            .filter(|person| person.is_quarantined())
            .map(Person::id)
            .collect()
    }

    fn seed_infection(&mut self, person_id: PersonId) {
        let person = &mut self.get_data_container_mut(PeoplePlugin).people[person_id.0];
        person.set_health_status(HealthStatus::Infected);
        debug!("seeded infection in person {person_id}");
    }

    fn seed_infections(&mut self, count: usize) -> Vec<PersonId> {
        let population = self.get_population();
        let to_infect = self.sample(PopulationRng, |rng| {
            sample_multiple_from_known_length(rng, (0..population).map(PersonId), count)
        });
        for person_id in &to_infect {
            self.seed_infection(*person_id);
        }
        to_infect
    }

    fn infect_person(&mut self, person_id: PersonId) -> bool {
        let exposed = with_person_mut(self, person_id, |context, person| {
            context.sample(InfectionRng, |rng| person.infect(rng))
        });
        if exposed {
            debug!(
                "person {person_id} exposed on day {}",
                self.get_current_day()
            );
        }
        exposed
    }

    fn advance_person(&mut self, person_id: PersonId) -> Option<HealthStatus> {
        with_person_mut(self, person_id, |context, person| {
            context.sample(ProgressionRng, |rng| person.advance(rng))
        })
    }

    fn quarantine_person(&mut self, person_id: PersonId) -> bool {
        self.get_data_container_mut(PeoplePlugin).people[person_id.0].quarantine()
    }

    fn count_health_statuses(&self) -> HealthCounts {
        let mut counts = HealthCounts::default();
        for person in self.get_people() {
            counts.increment(person.health_status());
        }
        counts
    }

    fn get_infected_ids(&self) -> Vec<PersonId> {
        self.get_people()
            .iter()
            .filter(|person| person.health_status() == HealthStatus::Infected)
            .map(Person::id)
            .collect()
    }
}
