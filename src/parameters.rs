//! Parameters of a simulation run, stored on the `Context` as the `Parameters` global property.
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::define_global_property;
use crate::error::TraceNetError;
use crate::global_properties::ContextGlobalPropertiesExt;

/// Largest supported population. The contact network is a dense matrix of `n * n` cells.
pub const MAX_POPULATION: usize = 10_000;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Builder)]
#[serde(default, deny_unknown_fields)]
pub struct ParametersValues {
    #[builder(default = "3")]
    pub neighbourhood_count: usize,

    #[builder(default = "10")]
    pub residents_per_neighbourhood: usize,

    /// Number of within-neighbourhood neighbours in the ring lattice. Must be even.
    #[builder(default = "4")]
    pub connection_degree: usize,

    #[builder(default = "0.05")]
    pub careless_probability: f64,

    #[builder(default = "0.0")]
    pub rewire_probability: f64,

    /// Percentage (0-100) of the population given one cross-neighbourhood contact each day.
    #[builder(default = "1.0")]
    pub ephemeral_contact_percentage: f64,

    #[builder(default = "true")]
    pub include_quarantining: bool,

    #[builder(default = "0.5")]
    pub app_usage_rate: f64,

    #[builder(default = "0.5")]
    pub quarantine_probability: f64,

    #[builder(default = "false")]
    pub include_self_test: bool,

    /// Days of contact history kept by the tracing app.
    #[builder(default = "4")]
    pub contact_history_days: usize,

    #[builder(default = "0.0148")]
    pub initial_infection_rate: f64,

    #[builder(default = "210")]
    pub max_days: usize,

    #[builder(default = "0")]
    pub seed: u64,
}

define_global_property!(Parameters, ParametersValues);

impl Default for ParametersValues {
    fn default() -> Self {
        ParametersValuesBuilder::default()
            .build()
            .expect("every parameter has a default")
    }
}

fn check_probability(name: &str, value: f64) -> Result<(), TraceNetError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TraceNetError::ConfigurationError(format!(
            "{name} must be in [0, 1], got {value}"
        )))
    }
}

impl ParametersValues {
    /// Total number of people in the population.
    #[must_use]
    pub fn population_size(&self) -> usize {
        self.neighbourhood_count.saturating_mul(self.residents_per_neighbourhood)
    }

    /// Checks every parameter against its allowed range.
    ///
    /// # Errors
    /// Returns `TraceNetError::ConfigurationError` describing the first invalid parameter.
    pub fn validate(&self) -> Result<(), TraceNetError> {
        if self.neighbourhood_count == 0 {
            return Err(TraceNetError::ConfigurationError(
                "neighbourhood_count must be at least 1".to_string(),
            ));
        }
        let population = self
            .neighbourhood_count
            .checked_mul(self.residents_per_neighbourhood)
            .filter(|population| population.checked_mul(*population).is_some());
        match population {
            Some(population) if population <= MAX_POPULATION => {}
            _ => {
                return Err(TraceNetError::ConfigurationError(format!(
                    "population of {} neighbourhoods of {} residents exceeds {MAX_POPULATION}",
                    self.neighbourhood_count, self.residents_per_neighbourhood
                )));
            }
        }
        if self.connection_degree % 2 != 0 {
            return Err(TraceNetError::ConfigurationError(format!(
                "connection_degree must be even, got {}",
                self.connection_degree
            )));
        }
        if self.residents_per_neighbourhood <= self.connection_degree {
            return Err(TraceNetError::ConfigurationError(format!(
                "residents_per_neighbourhood ({}) must exceed connection_degree ({})",
                self.residents_per_neighbourhood, self.connection_degree
            )));
        }
        check_probability("careless_probability", self.careless_probability)?;
        check_probability("rewire_probability", self.rewire_probability)?;
        check_probability("app_usage_rate", self.app_usage_rate)?;
        check_probability("quarantine_probability", self.quarantine_probability)?;
        check_probability("initial_infection_rate", self.initial_infection_rate)?;
        if !(0.0..=100.0).contains(&self.ephemeral_contact_percentage) {
            return Err(TraceNetError::ConfigurationError(format!(
                "ephemeral_contact_percentage must be in [0, 100], got {}",
                self.ephemeral_contact_percentage
            )));
        }
        Ok(())
    }

    /// Number of people infected at the start of a run: the rounded share of the population,
    /// but at least one whenever the rate is positive.
    #[must_use]
    pub fn initial_infections(&self) -> usize {
        let population = self.population_size();
        if self.initial_infection_rate <= 0.0 || population == 0 {
            return 0;
        }
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let count = (population as f64 * self.initial_infection_rate).round() as usize;
        count.clamp(1, population)
    }
}

/// Reads parameters from a JSON file. Missing fields take their default values.
///
/// # Errors
/// Returns an error if the file cannot be read or is not valid parameter JSON.
pub fn load_parameters_from_json(file_path: &Path) -> Result<ParametersValues, TraceNetError> {
    let file = File::open(file_path)?;
    let reader = BufReader::new(file);
    let parameters: ParametersValues = serde_json::from_reader(reader)?;
    Ok(parameters)
}

pub trait ContextParametersExt {
    /// Validates `parameters` and stores them as the `Parameters` global property.
    ///
    /// # Errors
    /// Returns a `ConfigurationError` for invalid parameters, or an error if parameters were
    /// already set.
    fn init_parameters(&mut self, parameters: ParametersValues) -> Result<(), TraceNetError>;

    /// Returns the run parameters.
    ///
    /// # Panics
    /// Panics if `init_parameters` has not been called.
    fn get_parameters(&self) -> &ParametersValues;
}

impl ContextParametersExt for Context {
    fn init_parameters(&mut self, parameters: ParametersValues) -> Result<(), TraceNetError> {
        parameters.validate()?;
        self.set_global_property_value(Parameters, parameters)
    }

    fn get_parameters(&self) -> &ParametersValues {
        self.get_global_property_value(Parameters)
            .expect("Parameters must be initialized with init_parameters")
    }
}
