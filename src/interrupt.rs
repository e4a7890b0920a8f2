//! Seven-level priority interrupt logic of the CPU card.
//!
//! Requests are level triggered: a line stays pending for as long as the
//! requesting device holds it, and the INT output of the card follows the
//! OR of all pending lines. On an acknowledge cycle the lowest numbered
//! pending line wins, its IACK strobe is pulsed so the device can drop its
//! request, and the 8080 is handed the matching `RST n` opcode.

use std::{mem, ops::RangeInclusive};

use crate::{
    error::ConfigError,
    signal::{LineSink, WriteLine},
};

/// Request lines decoded by the priority scan, highest priority first.
pub const IRQ_LINES: RangeInclusive<u8> = 1..=7;

/// `RST 0`. Line `n` is answered with `RST_BASE | n << 3`.
pub const RST_BASE: u8 = 0xC7;

pub fn restart_opcode(line: u8) -> u8 {
    RST_BASE | ((line & 0x07) << 3)
}

/// Result of an INTA cycle: the opcode for the data bus and the line whose
/// IACK strobe has to be pulsed, if any line was pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledge {
    pub opcode: u8,
    pub line: Option<u8>,
}

/// Mask and INT state. The IACK and INT outputs are only held here; the
/// owning module decides when they are driven.
#[derive(Debug, Default)]
pub struct InterruptController {
    // 1 = pending; bit 0 is never set
    mask: u8,
    int_line: bool,
    iack: [WriteLine; 8],
    int_out: WriteLine,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.mask = 0;
        self.update_int_line();
    }

    pub fn bind_int(&mut self, sink: impl LineSink + 'static) {
        self.int_out.bind(sink);
    }

    pub fn bind_iack(&mut self, line: u8, sink: impl LineSink + 'static) -> Result<(), ConfigError> {
        if !IRQ_LINES.contains(&line) {
            return Err(ConfigError::InvalidLine(line));
        }
        self.iack[line as usize].bind(sink);
        Ok(())
    }

    pub fn has_iack(&self, line: u8) -> bool {
        IRQ_LINES.contains(&line) && self.iack[line as usize].is_bound()
    }

    /// Logical request: `asserted == true` marks the line pending. Returns
    /// false when the line is not decoded and nothing changed.
    pub fn request(&mut self, line: u8, asserted: bool) -> bool {
        if !IRQ_LINES.contains(&line) {
            tracing::trace!("[IRQ] Ignoring request on undecoded line {}", line);
            return false;
        }

        let bit = 1 << line;
        if asserted {
            self.mask |= bit;
        } else {
            self.mask &= !bit;
        }
        tracing::trace!(
            "[IRQ] IREQ{} {} mask={:08b}",
            line,
            if asserted { "asserted" } else { "released" },
            self.mask
        );
        self.update_int_line();
        true
    }

    /// Pin-level request; the /IREQ lines are active low.
    pub fn ireq_w(&mut self, line: u8, state: bool) -> bool {
        self.request(line, !state)
    }

    pub fn highest_pending(&self) -> Option<u8> {
        IRQ_LINES.clone().find(|line| self.mask & (1 << line) != 0)
    }

    /// Answers an 8080 INTA cycle. Does not clear the request; the device
    /// behind the line is expected to release it when it sees IACK.
    pub fn acknowledge(&self) -> Acknowledge {
        match self.highest_pending() {
            Some(line) => {
                let opcode = restart_opcode(line);
                tracing::trace!("[IRQ] INTA -> IREQ{} (RST {}, {:02X})", line, line, opcode);
                Acknowledge {
                    opcode,
                    line: Some(line),
                }
            }
            None => {
                tracing::trace!("[IRQ] INTA with nothing pending");
                Acknowledge {
                    opcode: RST_BASE,
                    line: None,
                }
            }
        }
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }

    pub fn int_line(&self) -> bool {
        self.int_line
    }

    pub(crate) fn restore_mask(&mut self, mask: u8) {
        self.mask = mask & 0xFE;
        self.update_int_line();
    }

    pub(crate) fn take_int(&mut self) -> WriteLine {
        mem::take(&mut self.int_out)
    }

    pub(crate) fn put_int(&mut self, output: WriteLine) {
        self.int_out = output;
    }

    pub(crate) fn take_iack(&mut self, line: u8) -> WriteLine {
        mem::take(&mut self.iack[(line & 0x07) as usize])
    }

    pub(crate) fn put_iack(&mut self, line: u8, output: WriteLine) {
        self.iack[(line & 0x07) as usize] = output;
    }

    fn update_int_line(&mut self) {
        let state = self.mask != 0;
        if state != self.int_line {
            tracing::trace!("[IRQ] INT {}", if state { "raised" } else { "cleared" });
        }
        self.int_line = state;
    }
}
