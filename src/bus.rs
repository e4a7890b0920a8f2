// +------------+------------------------------------------------+
// | Signal     | Description                                    |
// +------------+------------------------------------------------+
// | AB0-AB15   | Shared memory address space                    |
// | /IREQ2     | Interrupt request                              |
// | /IREQ4-7   | Interrupt requests (IREQ1/3 are CPU card pins) |
// | /DR1-4     | DMA requests                                   |
// +------------+------------------------------------------------+

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    signal::{LineSink, WriteLine, FILL_VALUE},
};

/// Highest address reachable through AB0-AB15.
pub const BUS_SPACE_END: u32 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusLine {
    Ireq2,
    Ireq4,
    Ireq5,
    Ireq6,
    Ireq7,
    Dr1,
    Dr2,
    Dr3,
    Dr4,
}

impl BusLine {
    pub const ALL: [BusLine; 9] = [
        BusLine::Ireq2,
        BusLine::Ireq4,
        BusLine::Ireq5,
        BusLine::Ireq6,
        BusLine::Ireq7,
        BusLine::Dr1,
        BusLine::Dr2,
        BusLine::Dr3,
        BusLine::Dr4,
    ];

    pub fn ireq(line: u8) -> Option<BusLine> {
        match line {
            2 => Some(BusLine::Ireq2),
            4 => Some(BusLine::Ireq4),
            5 => Some(BusLine::Ireq5),
            6 => Some(BusLine::Ireq6),
            7 => Some(BusLine::Ireq7),
            _ => None,
        }
    }

    pub fn dma_request(channel: u8) -> Option<BusLine> {
        match channel {
            1 => Some(BusLine::Dr1),
            2 => Some(BusLine::Dr2),
            3 => Some(BusLine::Dr3),
            4 => Some(BusLine::Dr4),
            _ => None,
        }
    }

    /// Interrupt level carried by the line, if it is an IREQ line.
    pub fn irq_level(&self) -> Option<u8> {
        match self {
            BusLine::Ireq2 => Some(2),
            BusLine::Ireq4 => Some(4),
            BusLine::Ireq5 => Some(5),
            BusLine::Ireq6 => Some(6),
            BusLine::Ireq7 => Some(7),
            _ => None,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RamWindow {
    pub start: u16,
    pub end: u16,
    pub data: Vec<u8>,
}

impl RamWindow {
    pub fn contains(&self, address: u16) -> bool {
        (self.start..=self.end).contains(&address)
    }

    fn overlaps(&self, start: u32, end: u32) -> bool {
        start <= self.end as u32 && end >= self.start as u32
    }
}

impl fmt::Display for RamWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:04X} - 0x{:04X} - RAM ({} bytes)",
            self.start,
            self.end,
            self.data.len()
        )
    }
}

/// The backplane: one shared memory space plus the request lines cards
/// drive towards the CPU card. Lines are passed straight through; any
/// arbitration happens on the CPU card.
#[derive(Debug, Default)]
pub struct ExpansionBus {
    windows: Vec<RamWindow>,
    lines: [WriteLine; 9],
}

impl ExpansionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `data` at `start..=end`. Windows are permanent once installed.
    pub fn install_ram(&mut self, start: u32, end: u32, data: Vec<u8>) -> Result<(), ConfigError> {
        if end < start || end > BUS_SPACE_END {
            return Err(ConfigError::OutOfBounds { start, end });
        }
        if data.len() != (end - start + 1) as usize {
            return Err(ConfigError::SizeMismatch {
                start,
                end,
                len: data.len(),
            });
        }
        if let Some(existing) = self.windows.iter().find(|w| w.overlaps(start, end)) {
            return Err(ConfigError::Overlap {
                start,
                end,
                existing_start: existing.start as u32,
                existing_end: existing.end as u32,
            });
        }

        let window = RamWindow {
            start: start as u16,
            end: end as u16,
            data,
        };
        tracing::info!("[BUS] Installed {}", window);
        self.windows.push(window);
        self.windows.sort_by_key(|w| w.start);
        Ok(())
    }

    pub fn windows(&self) -> &[RamWindow] {
        &self.windows
    }

    pub fn is_mapped(&self, address: u16) -> bool {
        self.windows.iter().any(|w| w.contains(address))
    }

    pub fn read_byte(&self, address: u16) -> u8 {
        match self.windows.iter().find(|w| w.contains(address)) {
            Some(window) => window.data[(address - window.start) as usize],
            None => {
                tracing::trace!("[BUS] Read from unmapped address {:04X}", address);
                FILL_VALUE
            }
        }
    }

    pub fn write_byte(&mut self, address: u16, value: u8) {
        match self.windows.iter_mut().find(|w| w.contains(address)) {
            Some(window) => window.data[(address - window.start) as usize] = value,
            None => {
                tracing::trace!("[BUS] Write to unmapped address {:04X} = {:02X}", address, value);
            }
        }
    }

    pub fn bind_line(&mut self, line: BusLine, sink: impl LineSink + 'static) {
        self.lines[line.index()].bind(sink);
    }

    pub fn is_line_bound(&self, line: BusLine) -> bool {
        self.lines[line.index()].is_bound()
    }

    /// Driven by cards. Levels are the pin levels, so requests are active low.
    pub fn write_line(&mut self, line: BusLine, state: bool) {
        tracing::trace!("[BUS] {:?} <- {}", line, state as u8);
        self.lines[line.index()].write(state);
    }

    pub fn print_memory_map(&self) {
        for window in &self.windows {
            tracing::info!("[BUS] {}", window);
        }
    }
}
