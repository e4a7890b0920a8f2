// +-----------+---------------------------------+------------------------------+
// | Port      | IN                              | OUT                          |
// +-----------+---------------------------------+------------------------------+
// | 0xE4-0xE7 | External strobes A-D            | External strobes A-D         |
// | 0xF4      | UART receive data + data taken  | UART transmit data           |
// | 0xF5      | UART status                     | Reserved                     |
// | 0xF6      | External strobe E               | Reserved                     |
// | 0xF7      | External strobe F               | Bank select (CP/M mod only)  |
// | other     | 0xFF                            | Ignored                      |
// +-----------+---------------------------------+------------------------------+

use std::mem;

use crate::{
    error::ConfigError,
    signal::{ByteSink, ByteSource, ReadByte, WriteByte},
};

pub const PORT_UART_DATA: u8 = 0xF4;
pub const PORT_UART_STATUS: u8 = 0xF5;
pub const PORT_BANK_SELECT: u8 = 0xF7;

/// Ports with an outgoing write strobe.
pub const WRITE_STROBES: [u8; 4] = [0xE4, 0xE5, 0xE6, 0xE7];
/// Ports with an incoming read strobe.
pub const READ_STROBES: [u8; 6] = [0xE4, 0xE5, 0xE6, 0xE7, 0xF6, 0xF7];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRead {
    External(usize),
    UartData,
    UartStatus,
    Unmapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortWrite {
    External(usize),
    UartData,
    BankSelect,
    Reserved,
    Unmapped,
}

pub fn decode_read(port: u8) -> PortRead {
    match port {
        0xE4..=0xE7 => PortRead::External((port - 0xE4) as usize),
        PORT_UART_DATA => PortRead::UartData,
        PORT_UART_STATUS => PortRead::UartStatus,
        0xF6 => PortRead::External(4),
        0xF7 => PortRead::External(5),
        _ => PortRead::Unmapped,
    }
}

pub fn decode_write(port: u8) -> PortWrite {
    match port {
        0xE4..=0xE7 => PortWrite::External((port - 0xE4) as usize),
        PORT_UART_DATA => PortWrite::UartData,
        PORT_UART_STATUS | 0xF6 => PortWrite::Reserved,
        PORT_BANK_SELECT => PortWrite::BankSelect,
        _ => PortWrite::Unmapped,
    }
}

/// External strobes of the I/O decoder. Bound once while the machine is
/// assembled; anything left unbound floats.
#[derive(Debug, Default)]
pub struct PortTable {
    writes: [WriteByte; 4],
    reads: [ReadByte; 6],
}

impl PortTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_write(&mut self, port: u8, sink: impl ByteSink + 'static) -> Result<(), ConfigError> {
        match decode_write(port) {
            PortWrite::External(index) => {
                self.writes[index].bind(sink);
                Ok(())
            }
            _ => Err(ConfigError::NoStrobe(port)),
        }
    }

    pub fn bind_read(&mut self, port: u8, source: impl ByteSource + 'static) -> Result<(), ConfigError> {
        match decode_read(port) {
            PortRead::External(index) => {
                self.reads[index].bind(source);
                Ok(())
            }
            _ => Err(ConfigError::NoStrobe(port)),
        }
    }

    pub(crate) fn read(&mut self, index: usize) -> u8 {
        self.reads[index].read()
    }

    pub(crate) fn take_write(&mut self, index: usize) -> WriteByte {
        mem::take(&mut self.writes[index])
    }

    pub(crate) fn put_write(&mut self, index: usize, strobe: WriteByte) {
        self.writes[index] = strobe;
    }

    pub(crate) fn take_read(&mut self, index: usize) -> ReadByte {
        mem::take(&mut self.reads[index])
    }

    pub(crate) fn put_read(&mut self, index: usize, strobe: ReadByte) {
        self.reads[index] = strobe;
    }
}
