//! UART seen from the CPU card.
//!
//! The card carries an AY-5-1013 style UART; the chip itself lives outside
//! this crate and is reached through the [`Uart`] trait. [`LatchedUart`] is
//! a register-level stand-in with no bit timing, enough to run firmware and
//! tests against.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Display dot clock; the UART clock is derived from a third of it.
pub const DOT_CLOCK_HZ: u32 = 20_275_200;

/// Bits OR'ed into every status read, on top of [`UartStatusFlags::bits`].
pub const STATUS_BASE: u8 = 0xC4;
pub const STATUS_TBMT: u8 = 0x01;
pub const STATUS_DAV: u8 = 0x02;
pub const STATUS_PE: u8 = 0x08;
pub const STATUS_OR: u8 = 0x10;
pub const STATUS_FE: u8 = 0x20;

/// Factory setting: 9600 baud, no parity, one stop bit, eight data bits.
pub const DEFAULT_SWITCHES: u16 = 0x0CE;

const BAUD_RATES: [u32; 8] = [110, 300, 600, 1200, 2400, 4800, 9600, 19200];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UartStatusFlags {
    pub tbmt: bool,
    pub dav: bool,
    pub parity_error: bool,
    pub overrun: bool,
    pub framing_error: bool,
}

impl UartStatusFlags {
    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.tbmt {
            bits |= STATUS_TBMT;
        }
        if self.dav {
            bits |= STATUS_DAV;
        }
        if self.parity_error {
            bits |= STATUS_PE;
        }
        if self.overrun {
            bits |= STATUS_OR;
        }
        if self.framing_error {
            bits |= STATUS_FE;
        }
        bits
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UartFraming {
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

/// Decoded form of the 10-bit RS-232 switch field.
///
/// | Bits | Meaning                           |
/// |------|-----------------------------------|
/// | 0-2  | speed select, 110 .. 19200 baud   |
/// | 3    | no parity                         |
/// | 4    | even parity (when parity enabled) |
/// | 5    | two stop bits                     |
/// | 6-7  | data bits minus five              |
/// | 8-9  | unused                            |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartSwitches(u16);

impl UartSwitches {
    pub fn new(value: u16) -> Self {
        Self(value & 0x3FF)
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    pub fn speed_select(&self) -> u8 {
        (self.0 & 0x07) as u8
    }

    pub fn baud_rate(&self) -> u32 {
        BAUD_RATES[self.speed_select() as usize]
    }

    /// Receive/transmit clock fed to the UART, sixteen times the baud rate.
    pub fn clock_hz(&self) -> u32 {
        let select = self.speed_select();
        let u46_divisor = if select == 0 { 15 } else { 11 };
        let u22_divisor = 256 >> select;
        DOT_CLOCK_HZ / 3 / (u46_divisor * u22_divisor)
    }

    pub fn framing(&self) -> UartFraming {
        let parity = if self.0 & 0x08 != 0 {
            Parity::None
        } else if self.0 & 0x10 != 0 {
            Parity::Even
        } else {
            Parity::Odd
        };

        UartFraming {
            data_bits: 5 + ((self.0 >> 6) & 0x03) as u8,
            parity,
            stop_bits: if self.0 & 0x20 != 0 { 2 } else { 1 },
        }
    }
}

impl Default for UartSwitches {
    fn default() -> Self {
        Self::new(DEFAULT_SWITCHES)
    }
}

pub trait Uart {
    /// Received data register.
    fn receive(&mut self) -> u8;
    fn transmit(&mut self, data: u8);
    /// RDAV strobe; driving it low clears data-available.
    fn set_data_taken(&mut self, state: bool);
    fn status(&self) -> UartStatusFlags;
    /// Bit 7 as latched by the receiver, used by early boards on status reads.
    fn received_bit7(&self) -> bool;
    fn set_serial_input(&mut self, state: bool);
    fn configure(&mut self, framing: &UartFraming, clock_hz: u32);
    fn reset(&mut self);
}

#[derive(Debug, Clone)]
pub struct LatchedUart {
    rx_data: u8,
    dav: bool,
    parity_error: bool,
    overrun: bool,
    framing_error: bool,
    serial_input: bool,
    framing: Option<UartFraming>,
    clock_hz: u32,
    transmitted: VecDeque<u8>,
}

impl LatchedUart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latches a byte as if it had just been shifted in.
    pub fn push_received(&mut self, data: u8) {
        if self.dav {
            self.overrun = true;
        }
        self.rx_data = self.mask_data(data);
        self.dav = true;
    }

    pub fn set_errors(&mut self, parity_error: bool, framing_error: bool) {
        self.parity_error = parity_error;
        self.framing_error = framing_error;
    }

    pub fn take_transmitted(&mut self) -> Option<u8> {
        self.transmitted.pop_front()
    }

    pub fn framing(&self) -> Option<UartFraming> {
        self.framing
    }

    pub fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    pub fn serial_input(&self) -> bool {
        self.serial_input
    }

    fn mask_data(&self, data: u8) -> u8 {
        match self.framing {
            Some(framing) if framing.data_bits < 8 => data & ((1 << framing.data_bits) - 1),
            _ => data,
        }
    }
}

impl Default for LatchedUart {
    fn default() -> Self {
        Self {
            rx_data: 0,
            dav: false,
            parity_error: false,
            overrun: false,
            framing_error: false,
            serial_input: true,
            framing: None,
            clock_hz: 0,
            transmitted: VecDeque::new(),
        }
    }
}

impl Uart for LatchedUart {
    fn receive(&mut self) -> u8 {
        self.rx_data
    }

    fn transmit(&mut self, data: u8) {
        let data = self.mask_data(data);
        tracing::trace!("[UART] TX {:02X}", data);
        self.transmitted.push_back(data);
    }

    fn set_data_taken(&mut self, state: bool) {
        if !state {
            self.dav = false;
            self.overrun = false;
        }
    }

    fn status(&self) -> UartStatusFlags {
        UartStatusFlags {
            tbmt: true,
            dav: self.dav,
            parity_error: self.parity_error,
            overrun: self.overrun,
            framing_error: self.framing_error,
        }
    }

    fn received_bit7(&self) -> bool {
        self.rx_data & 0x80 != 0
    }

    fn set_serial_input(&mut self, state: bool) {
        self.serial_input = state;
    }

    fn configure(&mut self, framing: &UartFraming, clock_hz: u32) {
        tracing::debug!(
            "[UART] {} data bits, parity {:?}, {} stop bits, clock {} Hz",
            framing.data_bits,
            framing.parity,
            framing.stop_bits,
            clock_hz
        );
        self.framing = Some(*framing);
        self.clock_hz = clock_hz;
    }

    fn reset(&mut self) {
        self.rx_data = 0;
        self.dav = false;
        self.parity_error = false;
        self.overrun = false;
        self.framing_error = false;
        self.transmitted.clear();
    }
}
