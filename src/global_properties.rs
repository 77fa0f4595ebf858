//! Global properties are typed, write-once values stored on the `Context`, such as the
//! parameters of a run. A property is declared with `define_global_property!` and read back
//! through `ContextGlobalPropertiesExt`.
use std::any::{Any, TypeId};

use crate::context::Context;
use crate::error::TraceNetError;
use crate::{define_data_plugin, HashMap};

#[macro_export]
macro_rules! define_global_property {
    ($global_property:ident, $value:ty) => {
        #[derive(Copy, Clone)]
        pub struct $global_property;

        impl $crate::global_properties::GlobalProperty for $global_property {
            type Value = $value;

            fn name() -> &'static str {
                stringify!($global_property)
            }
        }
    };
}
pub use define_global_property;

pub trait GlobalProperty: Any {
    type Value: Any;

    fn name() -> &'static str;
}

struct GlobalPropertiesDataContainer {
    global_property_container: HashMap<TypeId, Box<dyn Any>>,
}

define_data_plugin!(
    GlobalPropertiesPlugin,
    GlobalPropertiesDataContainer,
    GlobalPropertiesDataContainer {
        global_property_container: HashMap::default(),
    }
);

pub trait ContextGlobalPropertiesExt {
    /// Sets the value of a global property. A property can only be set once.
    ///
    /// # Errors
    /// Returns `TraceNetError::IllegalGlobalPropertyChange` if the property already has a value.
    fn set_global_property_value<T: GlobalProperty>(
        &mut self,
        property: T,
        value: T::Value,
    ) -> Result<(), TraceNetError>;

    /// Returns the value of a global property, or `None` if it has not been set.
    fn get_global_property_value<T: GlobalProperty>(&self, property: T) -> Option<&T::Value>;
}

impl ContextGlobalPropertiesExt for Context {
    fn set_global_property_value<T: GlobalProperty>(
        &mut self,
        _property: T,
        value: T::Value,
    ) -> Result<(), TraceNetError> {
        let data_container = self.get_data_container_mut(GlobalPropertiesPlugin);
        if data_container
            .global_property_container
            .contains_key(&TypeId::of::<T>())
        {
            return Err(TraceNetError::IllegalGlobalPropertyChange(format!(
                "{} is already set",
                T::name()
            )));
        }
        data_container
            .global_property_container
            .insert(TypeId::of::<T>(), Box::new(value));
        Ok(())
    }

    fn get_global_property_value<T: GlobalProperty>(&self, _property: T) -> Option<&T::Value> {
        self.get_data_container(GlobalPropertiesPlugin)?
            .global_property_container
            .get(&TypeId::of::<T>())?
            .downcast_ref::<T::Value>()
    }
}
