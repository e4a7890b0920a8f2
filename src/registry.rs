use std::collections::BTreeMap;

use crate::{
    error::ConfigError,
    slot::{Card, DramCard, SramCard},
};

pub type CardFactory = fn() -> Box<dyn Card>;

/// Card options that can be plugged into a slot, by option name.
#[derive(Debug, Default, Clone)]
pub struct CardRegistry {
    factories: BTreeMap<&'static str, CardFactory>,
}

impl CardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The memory boards offered for the TDV-2100 backplane.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("dram_memory", dram_card);
        registry.register("sram_memory", sram_card);
        registry
    }

    pub fn register(&mut self, name: &'static str, factory: CardFactory) {
        if self.factories.insert(name, factory).is_some() {
            tracing::warn!("[SLOT] Card option {} registered twice", name);
        }
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn Card>, ConfigError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| ConfigError::UnknownCard(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }
}

fn dram_card() -> Box<dyn Card> {
    Box::new(DramCard::new())
}

fn sram_card() -> Box<dyn Card> {
    Box::new(SramCard::new())
}
