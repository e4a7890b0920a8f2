pub mod bus;
pub mod config;
pub mod cpu;
pub mod error;
pub mod firmware;
pub mod interrupt;
pub mod io;
pub mod logging;
pub mod machine;
pub mod memory;
pub mod ports;
pub mod registry;
pub mod signal;
pub mod slot;
pub mod uart;
pub mod utils;

pub use bus::{BusLine, ExpansionBus};
pub use config::{BoardRevision, CpuConfig, MemoryLayout};
pub use cpu::{CpuModule, CpuSnapshot, ModuleState};
pub use error::ConfigError;
pub use firmware::FirmwareImage;
pub use io::{I8080Io, Io};
pub use machine::{Machine, MachineBuilder, Model};
pub use memory::Bank;
pub use registry::CardRegistry;
pub use utils::hexdump;

/// A TDV-2114 with the 16K SRAM board in the first slot.
pub fn get_machine(rom_data: &[u8]) -> Result<Machine, ConfigError> {
    MachineBuilder::new()
        .model(Model::Tdv2114)
        .rom(rom_data)
        .card_slot("sram_memory")
        .empty_slot()
        .build()
}
