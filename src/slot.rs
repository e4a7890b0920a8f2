use std::{
    cell::RefCell,
    fmt::{self, Debug},
    rc::{Rc, Weak},
};

use crate::{bus::ExpansionBus, error::ConfigError};

/// An expansion card. Cards reach the backplane through a bus reference the
/// slot hands them during resolution, and do all their mapping in `start`.
pub trait Card: Debug {
    fn name(&self) -> &'static str;
    fn set_bus(&mut self, bus: Weak<RefCell<ExpansionBus>>);
    fn has_bus(&self) -> bool;
    fn start(&mut self) -> Result<(), ConfigError>;
    fn reset(&mut self) {}
}

/// Bus plumbing shared by every card.
#[derive(Debug, Default)]
pub struct CardInterface {
    bus: Option<Weak<RefCell<ExpansionBus>>>,
}

impl CardInterface {
    pub fn set_bus(&mut self, bus: Weak<RefCell<ExpansionBus>>) {
        self.bus = Some(bus);
    }

    pub fn has_bus(&self) -> bool {
        self.bus.is_some()
    }

    /// Fails when the card was never resolved against a bus.
    pub fn pre_start(&self, card: &str) -> Result<Rc<RefCell<ExpansionBus>>, ConfigError> {
        let bus = self.bus.as_ref().ok_or_else(|| ConfigError::MissingDependency {
            slot: card.to_string(),
        })?;
        bus.upgrade().ok_or(ConfigError::BusGone)
    }
}

pub const SRAM_START: u32 = 0x4000;
pub const SRAM_END: u32 = 0x7FFF;

/// 16K static RAM board, strapped to 0x4000-0x7FFF.
#[derive(Debug, Default)]
pub struct SramCard {
    interface: CardInterface,
    installed: bool,
}

impl SramCard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }
}

impl Card for SramCard {
    fn name(&self) -> &'static str {
        "sram_memory"
    }

    fn set_bus(&mut self, bus: Weak<RefCell<ExpansionBus>>) {
        self.interface.set_bus(bus);
    }

    fn has_bus(&self) -> bool {
        self.interface.has_bus()
    }

    fn start(&mut self) -> Result<(), ConfigError> {
        let bus = self.interface.pre_start(self.name())?;
        if self.installed {
            return Ok(());
        }

        let size = (SRAM_END - SRAM_START + 1) as usize;
        bus.borrow_mut()
            .install_ram(SRAM_START, SRAM_END, vec![0; size])?;
        self.installed = true;
        Ok(())
    }
}

/// DRAM board. Only the bus attachment exists so far; the bank strapping
/// that decides where its 8K chunks land is not modelled, so it maps
/// nothing.
#[derive(Debug, Default)]
pub struct DramCard {
    interface: CardInterface,
}

impl DramCard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Card for DramCard {
    fn name(&self) -> &'static str {
        "dram_memory"
    }

    fn set_bus(&mut self, bus: Weak<RefCell<ExpansionBus>>) {
        self.interface.set_bus(bus);
    }

    fn has_bus(&self) -> bool {
        self.interface.has_bus()
    }

    fn start(&mut self) -> Result<(), ConfigError> {
        self.interface.pre_start(self.name())?;
        tracing::debug!("[SLOT] DRAM card started without mapping");
        Ok(())
    }
}

/// One backplane connector. Built with an unresolved bus reference; the
/// reference is handed to the card in [`ExpansionSlot::resolve_objects`].
#[derive(Debug)]
pub struct ExpansionSlot {
    tag: String,
    bus: Option<Weak<RefCell<ExpansionBus>>>,
    card: Option<Box<dyn Card>>,
}

impl ExpansionSlot {
    pub fn new(tag: impl Into<String>, card: Option<Box<dyn Card>>) -> Self {
        Self {
            tag: tag.into(),
            bus: None,
            card,
        }
    }

    pub fn set_bus(&mut self, bus: &Rc<RefCell<ExpansionBus>>) {
        self.bus = Some(Rc::downgrade(bus));
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn card(&self) -> Option<&dyn Card> {
        self.card.as_deref()
    }

    pub fn resolve_objects(&mut self) -> Result<(), ConfigError> {
        let Some(card) = &mut self.card else {
            return Ok(());
        };
        let Some(bus) = &self.bus else {
            return Err(ConfigError::MissingDependency {
                slot: self.tag.clone(),
            });
        };

        tracing::debug!("[SLOT] {}: {} attached to bus", self.tag, card.name());
        card.set_bus(bus.clone());
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), ConfigError> {
        match &mut self.card {
            Some(card) if !card.has_bus() => Err(ConfigError::MissingDependency {
                slot: self.tag.clone(),
            }),
            Some(card) => card.start(),
            None => Ok(()),
        }
    }

    pub fn reset(&mut self) {
        if let Some(card) = &mut self.card {
            card.reset();
        }
    }
}

impl fmt::Display for ExpansionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.card {
            Some(card) => write!(f, "{}: {}", self.tag, card.name()),
            None => write!(f, "{}: Empty", self.tag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> Rc<RefCell<ExpansionBus>> {
        Rc::new(RefCell::new(ExpansionBus::new()))
    }

    #[test]
    fn test_sram_installs_once() {
        let bus = bus();
        let mut slot = ExpansionSlot::new("slot1", Some(Box::new(SramCard::new())));
        slot.set_bus(&bus);
        slot.resolve_objects().unwrap();
        slot.start().unwrap();
        slot.start().unwrap();

        let bus = bus.borrow();
        assert_eq!(bus.windows().len(), 1);
        assert_eq!(bus.windows()[0].start, 0x4000);
        assert_eq!(bus.windows()[0].end, 0x7FFF);
    }

    #[test]
    fn test_unresolved_slot_fails_at_resolution() {
        let mut slot = ExpansionSlot::new("slot2", Some(Box::new(SramCard::new())));
        assert_eq!(
            slot.resolve_objects(),
            Err(ConfigError::MissingDependency {
                slot: "slot2".into()
            })
        );
        assert!(slot.start().is_err());
    }

    #[test]
    fn test_card_started_without_bus() {
        let mut card = SramCard::new();
        assert!(matches!(
            card.start(),
            Err(ConfigError::MissingDependency { .. })
        ));
        assert!(!card.is_installed());

        let mut dram = DramCard::new();
        assert!(dram.start().is_err());
    }

    #[test]
    fn test_dropped_bus() {
        let mut card = SramCard::new();
        {
            let bus = bus();
            card.set_bus(Rc::downgrade(&bus));
        }
        assert_eq!(card.start(), Err(ConfigError::BusGone));
    }

    #[test]
    fn test_empty_slot() {
        let mut slot = ExpansionSlot::new("slot3", None);
        assert!(slot.resolve_objects().is_ok());
        assert!(slot.start().is_ok());
        assert_eq!(slot.to_string(), "slot3: Empty");
    }

    #[test]
    fn test_dram_maps_nothing() {
        let bus = bus();
        let mut slot = ExpansionSlot::new("slot4", Some(Box::new(DramCard::new())));
        slot.set_bus(&bus);
        slot.resolve_objects().unwrap();
        slot.start().unwrap();
        assert!(bus.borrow().windows().is_empty());
        assert_eq!(slot.to_string(), "slot4: dram_memory");
    }
}
