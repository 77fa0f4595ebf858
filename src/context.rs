//! The `Context` owns all of the state of a single simulation run.
//!
//! Every model concern (the population, the contact network, the tracing
//! app, statistics, random number generators) stores its data in a *data
//! plugin*: a container created lazily the first time it is requested and
//! keyed by the plugin's type. Model code never holds references to other
//! plugins; it goes back through the `Context` each time, which is what lets
//! the person, network and tracing modules call into each other freely.
use std::any::{Any, TypeId};

use crate::HashMap;

/// A trait for objects that can provide data containers to be held by `Context`
pub trait DataPlugin: Any {
    type DataContainer;

    fn create_data_container() -> Self::DataContainer;
}

/// Defines a new type for storing data in `Context`.
#[macro_export]
macro_rules! define_data_plugin {
    ($plugin:ident, $data_container:ty, $default: expr) => {
        struct $plugin;

        impl $crate::context::DataPlugin for $plugin {
            type DataContainer = $data_container;

            fn create_data_container() -> Self::DataContainer {
                $default
            }
        }
    };
}
pub use define_data_plugin;

pub struct Context {
    data_plugins: HashMap<TypeId, Box<dyn Any>>,
    current_day: usize,
}

impl Context {
    #[must_use]
    pub fn new() -> Context {
        Context {
            data_plugins: HashMap::default(),
            current_day: 0,
        }
    }

    fn add_plugin<T: DataPlugin>(&mut self) {
        self.data_plugins
            .insert(TypeId::of::<T>(), Box::new(T::create_data_container()));
    }

    /// Returns a mutable reference to the data container for `T`, creating it if it
    /// doesn't exist yet.
    #[allow(clippy::missing_panics_doc)]
    pub fn get_data_container_mut<T: DataPlugin>(&mut self, _plugin: T) -> &mut T::DataContainer {
        let type_id = TypeId::of::<T>();
        if !self.data_plugins.contains_key(&type_id) {
            self.add_plugin::<T>();
        }
        self.data_plugins
            .get_mut(&type_id)
            .and_then(|data| data.downcast_mut::<T::DataContainer>())
            // Will never panic as the container was inserted with the matching type
            .expect("data container type mismatch")
    }

    /// Returns a reference to the data container for `T` if it exists.
    #[must_use]
    pub fn get_data_container<T: DataPlugin>(&self, _plugin: T) -> Option<&T::DataContainer> {
        self.data_plugins
            .get(&TypeId::of::<T>())
            .and_then(|data| data.downcast_ref::<T::DataContainer>())
    }

    /// The day currently being simulated (or the last one simulated).
    #[must_use]
    pub fn get_current_day(&self) -> usize {
        self.current_day
    }

    pub(crate) fn set_current_day(&mut self, day: usize) {
        self.current_day = day;
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
