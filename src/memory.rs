use std::{cell::RefCell, rc::Rc};

use derivative::Derivative;
use serde::{Deserialize, Serialize};

use crate::{bus::ExpansionBus, config::MemoryLayout, signal::FILL_VALUE};

pub const ROM_SIZE: usize = 0x2000;
/// On-board RAM is sized for the extended layout; the standard layout only
/// decodes the first 2 KiB of it.
pub const RAM_CAPACITY: usize = 0x1000;

// +---------------+---------------------+----------------------+
// | Range         | Bank 0 (Native)     | Bank 1 (CP/M)        |
// +---------------+---------------------+----------------------+
// | 0000-1FFF     | Firmware ROM        | Expansion bus        |
// | 2000-27FF/2FFF| On-board RAM        | Expansion bus        |
// | above         | Expansion bus       | Expansion bus        |
// +---------------+---------------------+----------------------+

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bank {
    #[default]
    Native,
    Expansion,
}

impl Bank {
    pub fn index(&self) -> u8 {
        match self {
            Bank::Native => 0,
            Bank::Expansion => 1,
        }
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct MemoryView {
    layout: MemoryLayout,
    bank: Bank,
    #[derivative(Debug = "ignore")]
    rom: Vec<u8>,
    #[derivative(Debug = "ignore")]
    ram: [u8; RAM_CAPACITY],
    #[derivative(Debug = "ignore")]
    bus: Rc<RefCell<ExpansionBus>>,
}

impl MemoryView {
    pub fn new(bus: Rc<RefCell<ExpansionBus>>, layout: MemoryLayout) -> Self {
        Self {
            layout,
            bank: Bank::Native,
            rom: vec![FILL_VALUE; ROM_SIZE],
            ram: [0; RAM_CAPACITY],
            bus,
        }
    }

    pub fn reset(&mut self) {
        self.bank = Bank::Native;
    }

    pub fn layout(&self) -> MemoryLayout {
        self.layout
    }

    pub fn bank(&self) -> Bank {
        self.bank
    }

    pub fn select_bank(&mut self, bank: Bank) {
        if bank != self.bank {
            tracing::debug!("[MEM] Switching to bank {} ({:?})", bank.index(), bank);
        }
        self.bank = bank;
    }

    /// Copies a firmware image into the ROM sockets; anything beyond the
    /// image reads as erased EPROM.
    pub fn load_rom(&mut self, image: &[u8]) {
        let len = image.len().min(ROM_SIZE);
        if image.len() > ROM_SIZE {
            tracing::warn!(
                "[MEM] Firmware image is {} bytes, truncating to {}",
                image.len(),
                ROM_SIZE
            );
        }
        self.rom.fill(FILL_VALUE);
        self.rom[..len].copy_from_slice(&image[..len]);
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    /// The decoded part of the on-board RAM.
    pub fn ram(&self) -> &[u8] {
        &self.ram[..self.layout.ram_size()]
    }

    pub(crate) fn ram_image(&self) -> &[u8; RAM_CAPACITY] {
        &self.ram
    }

    pub(crate) fn restore(&mut self, bank: Bank, ram: &[u8; RAM_CAPACITY]) {
        self.bank = bank;
        self.ram = *ram;
    }

    fn is_local(&self, address: u16) -> bool {
        self.bank == Bank::Native && address <= self.layout.view_end()
    }

    pub fn read_byte(&self, address: u16) -> u8 {
        if !self.is_local(address) {
            return self.bus.borrow().read_byte(address);
        }

        match address {
            0x0000..=MemoryLayout::ROM_END => self.rom[address as usize],
            _ => self.ram[(address - MemoryLayout::RAM_START) as usize],
        }
    }

    pub fn write_byte(&mut self, address: u16, value: u8) {
        if !self.is_local(address) {
            self.bus.borrow_mut().write_byte(address, value);
            return;
        }

        match address {
            0x0000..=MemoryLayout::ROM_END => {
                tracing::trace!(
                    "[MEM] Ignoring write to ROM - ${:04X} = ${:02X}",
                    address,
                    value
                );
            }
            _ => self.ram[(address - MemoryLayout::RAM_START) as usize] = value,
        }
    }

    pub fn read_word(&self, address: u16) -> u16 {
        let low_byte = self.read_byte(address) as u16;
        let high_byte = self.read_byte(address.wrapping_add(1)) as u16;
        (high_byte << 8) | low_byte
    }
}
