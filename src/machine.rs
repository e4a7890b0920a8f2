use std::{
    cell::{Ref, RefCell},
    fmt,
    rc::Rc,
};

use serde::{Deserialize, Serialize};

use crate::{
    bus::{BusLine, ExpansionBus},
    config::CpuConfig,
    cpu::{CpuModule, CpuSnapshot},
    error::ConfigError,
    firmware::FirmwareImage,
    io::{deliver, Io},
    registry::CardRegistry,
    signal::{ByteSink, ByteSource, LineSink},
    slot::ExpansionSlot,
    utils::hexdump,
};

/// Levels that reach the CPU card over the backplane rather than its own pins.
const BUS_IRQ_LINES: [u8; 5] = [2, 4, 5, 6, 7];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Model {
    #[default]
    Tdv2114,
    Tdv2124,
}

impl Model {
    pub fn firmware(&self) -> FirmwareImage {
        match self {
            Model::Tdv2114 => FirmwareImage::xmon_d_rev5(),
            Model::Tdv2124 => FirmwareImage::xmon_f_rev3(),
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Tdv2114 => write!(f, "TDV-2114"),
            Model::Tdv2124 => write!(f, "TDV-2124"),
        }
    }
}

pub struct Machine {
    /// Outputs raised through a direct borrow stay queued until the next
    /// call through `Machine` or [`Io`], or [`Machine::deliver_signals`].
    pub cpu: Rc<RefCell<CpuModule>>,
    pub bus: Rc<RefCell<ExpansionBus>>,
    slots: Vec<ExpansionSlot>,
    model: Model,
}

impl Machine {
    pub fn model(&self) -> Model {
        self.model
    }

    pub fn cpu(&self) -> Ref<'_, CpuModule> {
        self.cpu.borrow()
    }

    pub fn io(&self) -> Io {
        Io::new(self.cpu.clone())
    }

    pub fn slots(&self) -> &[ExpansionSlot] {
        &self.slots
    }

    pub fn reset(&mut self) {
        tracing::info!("[MACHINE] {} reset", self.model);
        self.cpu.borrow_mut().reset();
        for slot in &mut self.slots {
            slot.reset();
        }
        self.deliver_signals();
    }

    /// Interrupt strobes from the terminal, at pin level (active low).
    pub fn ireq_w(&self, line: u8, state: bool) {
        self.cpu.borrow_mut().ireq_w(line, state);
        self.deliver_signals();
    }

    pub fn deliver_signals(&self) {
        deliver(&self.cpu);
    }

    pub fn memory_dump(&self, start: u16, end: u16) -> String {
        let cpu = self.cpu.borrow();
        hexdump(start, end, |address| cpu.read_byte(address))
    }

    pub fn print_memory_map(&self) {
        for slot in &self.slots {
            tracing::info!("[MACHINE] {}", slot);
        }
        self.bus.borrow().print_memory_map();
    }

    pub fn save_state(&self) -> anyhow::Result<String> {
        let snapshot = self.cpu.borrow().snapshot();
        Ok(serde_json::to_string(&snapshot)?)
    }

    pub fn load_state(&mut self, state: &str) -> anyhow::Result<()> {
        let snapshot: CpuSnapshot = serde_json::from_str(state)?;
        self.cpu.borrow_mut().restore(&snapshot);
        self.deliver_signals();
        Ok(())
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("model", &self.model)
            .field("cpu", &self.cpu.borrow())
            .field("slots", &self.slots)
            .finish()
    }
}

type Binder = Box<dyn FnOnce(&mut CpuModule) -> Result<(), ConfigError>>;

#[derive(Default)]
pub struct MachineBuilder {
    model: Model,
    rom: Option<Vec<u8>>,
    config: CpuConfig,
    registry: Option<CardRegistry>,
    slots: Vec<Option<String>>,
    binders: Vec<Binder>,
}

impl MachineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Assembled 8 KiB ROM region; the model's sockets stay erased without it.
    pub fn rom(mut self, data: &[u8]) -> Self {
        self.rom = Some(data.to_vec());
        self
    }

    pub fn config(mut self, config: CpuConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, registry: CardRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn card_slot(mut self, card: &str) -> Self {
        self.slots.push(Some(card.to_string()));
        self
    }

    pub fn empty_slot(mut self) -> Self {
        self.slots.push(None);
        self
    }

    pub fn port_write(mut self, port: u8, sink: impl ByteSink + 'static) -> Self {
        self.binders
            .push(Box::new(move |cpu: &mut CpuModule| cpu.bind_port_write(port, sink)));
        self
    }

    pub fn port_read(mut self, port: u8, source: impl ByteSource + 'static) -> Self {
        self.binders
            .push(Box::new(move |cpu: &mut CpuModule| cpu.bind_port_read(port, source)));
        self
    }

    pub fn iack(mut self, line: u8, sink: impl LineSink + 'static) -> Self {
        self.binders
            .push(Box::new(move |cpu: &mut CpuModule| cpu.bind_iack(line, sink)));
        self
    }

    pub fn int_line(mut self, sink: impl LineSink + 'static) -> Self {
        self.binders.push(Box::new(move |cpu: &mut CpuModule| {
            cpu.bind_int(sink);
            Ok(())
        }));
        self
    }

    pub fn build(self) -> Result<Machine, ConfigError> {
        tracing::info!(
            "[MACHINE] Building {} with {} slot(s)",
            self.model,
            self.slots.len()
        );
        let registry = self.registry.unwrap_or_else(CardRegistry::with_defaults);
        let bus = Rc::new(RefCell::new(ExpansionBus::new()));

        // Object graph with unresolved back-references
        let mut slots = Vec::with_capacity(self.slots.len());
        for (n, option) in self.slots.iter().enumerate() {
            let card = option.as_deref().map(|name| registry.create(name)).transpose()?;
            let mut slot = ExpansionSlot::new(format!("slot{}", n), card);
            slot.set_bus(&bus);
            slots.push(slot);
        }

        for slot in &mut slots {
            slot.resolve_objects()?;
        }
        for slot in &mut slots {
            slot.start()?;
        }

        let rom = match self.rom {
            Some(rom) => rom,
            None => {
                let firmware = self.model.firmware();
                tracing::warn!("[MACHINE] No ROM supplied, {} sockets left erased", firmware.name);
                firmware.blank()
            }
        };
        let cpu = CpuModule::new(self.config, &rom, bus.clone()).into_shared();
        for binder in self.binders {
            binder(&mut *cpu.borrow_mut())?;
        }

        for level in BUS_IRQ_LINES {
            let Some(line) = BusLine::ireq(level) else {
                return Err(ConfigError::InvalidLine(level));
            };
            let target = Rc::downgrade(&cpu);
            bus.borrow_mut().bind_line(line, move |state: bool| {
                if let Some(cpu) = target.upgrade() {
                    cpu.borrow_mut().ireq_w(level, state);
                    deliver(&cpu);
                }
            });
        }

        let mut machine = Machine {
            cpu,
            bus,
            slots,
            model: self.model,
        };
        machine.reset();
        Ok(machine)
    }
}
