//! The contact-tracing app.
//!
//! A subset of the population carries the app. For every app user the app keeps the contacts
//! they had with other app users over the last few days. When a user is removed, each of their
//! recorded contacts is asked to quarantine with a fixed probability, optionally after a self
//! test. Every quarantine that is actually imposed is logged together with whether the person
//! was really carrying the disease at the time.
use std::collections::VecDeque;

use indexmap::IndexSet;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::parameters::ContextParametersExt;
use crate::people::{ContextPeopleExt, HealthStatus, PersonId};
use crate::random::ContextRandomExt;
use crate::{define_data_plugin, define_rng, HashMap};

/// Probability that a self test misses an infected person.
pub const SELF_TEST_FALSE_NEGATIVE_RATE: f64 = 0.0816;
/// Probability that a self test is positive for someone who is not infected.
pub const SELF_TEST_FALSE_POSITIVE_RATE: f64 = 0.0005;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub contact: PersonId,
    pub day: usize,
}

/// A quarantine that was imposed by the app.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub person: PersonId,
    pub day: usize,
    /// Whether the person was exposed or infected when quarantined.
    pub correct: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QuarantineOutcome {
    AlreadyQuarantined,
    TestedNegative,
    Quarantined { correct: bool },
}

struct ContactTracingData {
    histories: HashMap<PersonId, VecDeque<ContactRecord>>,
    history_days: usize,
    quarantine_log: Vec<QuarantineRecord>,
}

define_data_plugin!(
    ContactTracingPlugin,
    ContactTracingData,
    ContactTracingData {
        histories: HashMap::default(),
        history_days: 4,
        quarantine_log: Vec::new(),
    }
);

define_rng!(AppEnrolmentRng);
define_rng!(QuarantineRng);
define_rng!(SelfTestRng);

pub trait ContextContactTracingExt {
    /// Enrols app users: when quarantining is enabled, every person who is not careless
    /// installs the app with probability `app_usage_rate`. Returns the number of users.
    fn init_contact_tracing(&mut self) -> usize;

    /// Gives `person_id` the app, with an empty history.
    fn enrol_app_user(&mut self, person_id: PersonId);

    fn is_app_user(&self, person_id: PersonId) -> bool;

    /// All app users in ascending id order.
    fn get_app_users(&self) -> Vec<PersonId>;

    /// Records that `person_id` met `contact` on `day`. Does nothing unless both are app users.
    /// Entries more than the history window older than `day` are dropped afterwards.
    fn record_contact(&mut self, person_id: PersonId, contact: PersonId, day: usize);

    /// The contacts currently remembered for `person_id`, oldest first.
    fn get_contact_history(&self, person_id: PersonId) -> Vec<ContactRecord>;

    /// Notifies the app that `person_id` was removed. Each distinct remembered contact is asked
    /// to quarantine with probability `quarantine_probability`. Returns the number of requests.
    fn on_removed(&mut self, person_id: PersonId) -> usize;

    /// Asks `person_id` to quarantine. With self testing enabled the person first takes a test
    /// and only quarantines on a positive result.
    fn request_quarantine(&mut self, person_id: PersonId) -> QuarantineOutcome;

    fn get_quarantine_log(&self) -> &[QuarantineRecord];

    /// One flag per imposed quarantine: 1 if the person was exposed or infected, 0 otherwise.
    fn quarantine_audit(&self) -> Vec<u8>;
}

impl ContextContactTracingExt for Context {
    fn init_contact_tracing(&mut self) -> usize {
        let parameters = self.get_parameters().clone();
        self.get_data_container_mut(ContactTracingPlugin).history_days =
            parameters.contact_history_days;
        if !parameters.include_quarantining {
            info!("quarantining disabled; no app users");
            return 0;
        }

        let candidates: Vec<PersonId> = self
            .get_people()
            .iter()
            .filter(|person| !person.is_careless())
            .map(|person| person.id())
            .collect();
        for person_id in candidates {
            if self.sample_bool(AppEnrolmentRng, parameters.app_usage_rate) {
                self.enrol_app_user(person_id);
            }
        }

        let users = self.get_data_container_mut(ContactTracingPlugin).histories.len();
        info!(
            "{users} of {} people use the contact-tracing app",
            self.get_population()
        );
        users
    }

    fn enrol_app_user(&mut self, person_id: PersonId) {
        self.get_data_container_mut(ContactTracingPlugin)
            .histories
            .entry(person_id)
            .or_default();
    }

    fn is_app_user(&self, person_id: PersonId) -> bool {
        self.get_data_container(ContactTracingPlugin)
            .is_some_and(|data| data.histories.contains_key(&person_id))
    }

    fn get_app_users(&self) -> Vec<PersonId> {
        let mut users: Vec<PersonId> = self
            .get_data_container(ContactTracingPlugin)
            .map(|data| data.histories.keys().copied().collect())
            .unwrap_or_default();
        users.sort_unstable();
        users
    }

    fn record_contact(&mut self, person_id: PersonId, contact: PersonId, day: usize) {
        if !self.is_app_user(person_id) || !self.is_app_user(contact) {
            return;
        }
        let data = self.get_data_container_mut(ContactTracingPlugin);
        let history_days = data.history_days;
        let Some(history) = data.histories.get_mut(&person_id) else {
            return;
        };
        history.push_back(ContactRecord { contact, day });
        while history
            .front()
            .is_some_and(|oldest| day.saturating_sub(oldest.day) > history_days)
        {
            history.pop_front();
        }
    }

    fn get_contact_history(&self, person_id: PersonId) -> Vec<ContactRecord> {
        self.get_data_container(ContactTracingPlugin)
            .and_then(|data| data.histories.get(&person_id))
            .map(|history| history.iter().copied().collect())
            .unwrap_or_default()
    }

    fn on_removed(&mut self, person_id: PersonId) -> usize {
        let day = self.get_current_day();
        let history_days = self
            .get_data_container(ContactTracingPlugin)
            .map_or(0, |data| data.history_days);
        // Histories are only trimmed on append, so entries can be older than the window.
        let contacts: IndexSet<PersonId> = self
            .get_contact_history(person_id)
            .into_iter()
            .filter(|record| day.saturating_sub(record.day) <= history_days)
            .map(|record| record.contact)
            .collect();
        if contacts.is_empty() {
            return 0;
        }

        let quarantine_probability = self.get_parameters().quarantine_probability;
        let mut requests = 0;
        for contact in contacts {
            if self.sample_bool(QuarantineRng, quarantine_probability) {
                self.request_quarantine(contact);
                requests += 1;
            }
        }
        debug!("person {person_id} removed on day {day}: {requests} quarantine requests");
        requests
    }

    fn request_quarantine(&mut self, person_id: PersonId) -> QuarantineOutcome {
        if self.is_quarantined(person_id) {
            trace!("person {person_id} is already quarantined");
            return QuarantineOutcome::AlreadyQuarantined;
        }

        let health_status = self.get_health_status(person_id);
        if self.get_parameters().include_self_test {
            let positive_probability = if health_status == HealthStatus::Infected {
                1.0 - SELF_TEST_FALSE_NEGATIVE_RATE
            } else {
                SELF_TEST_FALSE_POSITIVE_RATE
            };
            let positive = self.sample_bool(SelfTestRng, positive_probability);
            trace!("person {person_id} ({health_status}) self test positive: {positive}");
            if !positive {
                return QuarantineOutcome::TestedNegative;
            }
        }

        self.quarantine_person(person_id);
        let correct = matches!(
            health_status,
            HealthStatus::Exposed | HealthStatus::Infected
        );
        let day = self.get_current_day();
        self.get_data_container_mut(ContactTracingPlugin)
            .quarantine_log
            .push(QuarantineRecord {
                person: person_id,
                day,
                correct,
            });
        debug!("person {person_id} ({health_status}) quarantined on day {day}");
        QuarantineOutcome::Quarantined { correct }
    }

    fn get_quarantine_log(&self) -> &[QuarantineRecord] {
        self.get_data_container(ContactTracingPlugin)
            .map(|data| data.quarantine_log.as_slice())
            .unwrap_or_default()
    }

    fn quarantine_audit(&self) -> Vec<u8> {
        self.get_quarantine_log()
            .iter()
            .map(|record| u8::from(record.correct))
            .collect()
    }
}
