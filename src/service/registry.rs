//! Named engine instances.
//!
//! Every PV link names its instance first; links naming the same instance
//! share one engine. Instances are created once and looked up by name.

use std::collections::BTreeMap;

use crate::binding::PvBinding;
use crate::config::{EngineConfig, InstanceConfig, InstanceDefaults};
use crate::engine::FftEngine;

/// Instances by name, in name order.
#[derive(Debug, Default)]
pub struct EngineRegistry {
    defaults: InstanceDefaults,
    instances: BTreeMap<String, PvBinding>,
}

impl EngineRegistry {
    pub fn new(defaults: InstanceDefaults) -> Self {
        Self {
            defaults,
            instances: BTreeMap::new(),
        }
    }

    /// Build one binding per configured instance.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut registry = Self::new(config.defaults.clone());
        for instance in &config.instances {
            registry.find_or_create(instance);
        }
        registry
    }

    pub fn find(&self, name: &str) -> Option<&PvBinding> {
        self.instances.get(name)
    }

    /// The existing instance called `config.name`, or a new one built from
    /// `config`. An existing instance keeps its original setup.
    pub fn find_or_create(&mut self, config: &InstanceConfig) -> &mut PvBinding {
        let defaults = &self.defaults;
        self.instances
            .entry(config.name.clone())
            .or_insert_with(|| {
                tracing::info!(instance = %config.name, trigger = %config.trigger, "Creating engine instance");
                PvBinding::for_engine(FftEngine::from_config(config, defaults))
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Setup report for one instance, or `None` if it does not exist.
    ///
    /// Live status (count, alarm, exec time) belongs to the running
    /// instance; see `InstanceHandle::report`.
    pub fn show(&self, name: &str) -> Option<String> {
        self.find(name).map(|binding| binding.engine().setup_report())
    }

    pub(crate) fn into_bindings(self) -> impl Iterator<Item = (String, PvBinding)> {
        self.instances.into_iter()
    }
}
