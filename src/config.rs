use serde::{Deserialize, Serialize};

use crate::uart::{UartSwitches, DEFAULT_SWITCHES};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardRevision {
    #[default]
    Early,
    /// Later boards route the live RXD line onto D7 for every UART read.
    Late,
}

/// Extent of the bank-switched window at the bottom of the address space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryLayout {
    /// ROM 0x0000-0x1FFF, RAM 0x2000-0x27FF.
    #[default]
    Standard,
    /// ROM 0x0000-0x1FFF, RAM 0x2000-0x2FFF.
    Extended,
}

impl MemoryLayout {
    pub const ROM_END: u16 = 0x1FFF;
    pub const RAM_START: u16 = 0x2000;

    /// Last address of the switched window, which is also the end of RAM.
    pub fn view_end(&self) -> u16 {
        match self {
            MemoryLayout::Standard => 0x27FF,
            MemoryLayout::Extended => 0x2FFF,
        }
    }

    pub fn ram_size(&self) -> usize {
        (self.view_end() - Self::RAM_START) as usize + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    pub revision: BoardRevision,
    /// CP/M compatibility modification; enables the bank latch on port F7.
    pub cpm_mod: bool,
    pub layout: MemoryLayout,
    pub uart_switches: u16,
}

impl CpuConfig {
    pub fn switches(&self) -> UartSwitches {
        UartSwitches::new(self.uart_switches)
    }
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            revision: BoardRevision::Early,
            cpm_mod: false,
            layout: MemoryLayout::Standard,
            uart_switches: DEFAULT_SWITCHES,
        }
    }
}
