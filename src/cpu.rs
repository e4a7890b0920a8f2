//! The 8080 CPU card minus the 8080 itself.
//!
//! `CpuModule` owns everything on the card that sits between the processor
//! and the rest of the machine: the interrupt priority logic, the I/O
//! decoder, the UART glue and the ROM/RAM view with its CP/M bank latch.
//! The instruction core drives it through [`crate::io::I8080Io`].

use std::{cell::RefCell, collections::VecDeque, fmt, rc::Rc};

use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use crate::{
    bus::ExpansionBus,
    config::{BoardRevision, CpuConfig},
    error::ConfigError,
    interrupt::InterruptController,
    memory::{Bank, MemoryView, RAM_CAPACITY},
    ports::{decode_read, decode_write, PortRead, PortTable, PortWrite},
    signal::{ByteSink, ByteSource, LineSink, ReadByte, WriteByte, WriteLine, FILL_VALUE},
    uart::{LatchedUart, Uart, UartSwitches, STATUS_BASE},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Reset,
    Running,
    RunningBanked,
}

/// An edge the card drives onto one of its outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Int(bool),
    /// Pulse the IACK strobe of a line low, then high.
    Iack(u8),
    PortWrite(usize, u8),
}

/// A queued signal with its output lifted out of the module, so it can be
/// driven while nothing holds the module.
#[derive(Debug)]
pub(crate) enum Delivery {
    Int(bool, WriteLine),
    Iack(u8, WriteLine),
    PortWrite(usize, u8, WriteByte),
}

impl Delivery {
    pub(crate) fn drive(&mut self) {
        match self {
            Delivery::Int(state, output) => output.write(*state),
            Delivery::Iack(_, output) => output.pulse_low(),
            Delivery::PortWrite(_, value, strobe) => strobe.write(*value),
        }
    }
}

/// The part of the card that has to survive a save/restore.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CpuSnapshot {
    pub interrupt_mask: u8,
    pub bank: Bank,
    #[serde(with = "BigArray")]
    pub ram: [u8; RAM_CAPACITY],
}

impl fmt::Debug for CpuSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuSnapshot")
            .field("interrupt_mask", &format_args!("{:08b}", self.interrupt_mask))
            .field("bank", &self.bank)
            .finish_non_exhaustive()
    }
}

pub struct CpuModule<U: Uart = LatchedUart> {
    config: CpuConfig,
    state: ModuleState,
    irq: InterruptController,
    ports: PortTable,
    memory: MemoryView,
    uart: U,
    rxd: bool,
    outbox: VecDeque<Signal>,
    delivering: bool,
    // set once the module sits behind a shared handle
    deferred: bool,
}

impl CpuModule<LatchedUart> {
    pub fn new(config: CpuConfig, rom: &[u8], bus: Rc<RefCell<ExpansionBus>>) -> Self {
        Self::with_uart(config, rom, bus, LatchedUart::new())
    }
}

impl<U: Uart> CpuModule<U> {
    pub fn with_uart(config: CpuConfig, rom: &[u8], bus: Rc<RefCell<ExpansionBus>>, uart: U) -> Self {
        let mut memory = MemoryView::new(bus, config.layout);
        memory.load_rom(rom);

        let mut module = Self {
            config,
            state: ModuleState::Reset,
            irq: InterruptController::new(),
            ports: PortTable::new(),
            memory,
            uart,
            rxd: true,
            outbox: VecDeque::new(),
            delivering: false,
            deferred: false,
        };
        module.set_uart_state_from_switches();
        module
    }

    /// Moves the module behind a shared handle. From then on outputs are
    /// queued and driven by [`crate::io::deliver`] once the borrow is gone.
    pub fn into_shared(mut self) -> Rc<RefCell<Self>> {
        self.defer_signals();
        Rc::new(RefCell::new(self))
    }

    pub(crate) fn defer_signals(&mut self) {
        self.deferred = true;
    }

    pub fn reset(&mut self) {
        tracing::debug!("[CPU] Reset");
        self.irq.reset();
        self.emit(Signal::Int(false));
        self.memory.reset();
        self.uart.reset();
        self.set_uart_state_from_switches();
        self.state = ModuleState::Reset;
    }

    pub fn config(&self) -> &CpuConfig {
        &self.config
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    pub fn bank(&self) -> Bank {
        self.memory.bank()
    }

    pub fn memory(&self) -> &MemoryView {
        &self.memory
    }

    pub fn uart(&self) -> &U {
        &self.uart
    }

    pub fn uart_mut(&mut self) -> &mut U {
        &mut self.uart
    }

    // Binding

    pub fn bind_int(&mut self, sink: impl LineSink + 'static) {
        self.irq.bind_int(sink);
    }

    pub fn bind_iack(&mut self, line: u8, sink: impl LineSink + 'static) -> Result<(), ConfigError> {
        self.irq.bind_iack(line, sink)
    }

    pub fn bind_port_write(&mut self, port: u8, sink: impl ByteSink + 'static) -> Result<(), ConfigError> {
        self.ports.bind_write(port, sink)
    }

    pub fn bind_port_read(&mut self, port: u8, source: impl ByteSource + 'static) -> Result<(), ConfigError> {
        self.ports.bind_read(port, source)
    }

    // Interrupts

    pub fn request(&mut self, line: u8, asserted: bool) {
        self.leave_reset();
        if self.irq.request(line, asserted) {
            self.emit(Signal::Int(self.irq.int_line()));
        }
    }

    pub fn ireq_w(&mut self, line: u8, state: bool) {
        self.request(line, !state);
    }

    pub fn acknowledge(&mut self) -> u8 {
        self.leave_reset();
        let ack = self.irq.acknowledge();
        if let Some(line) = ack.line {
            self.emit(Signal::Iack(line));
        }
        ack.opcode
    }

    pub fn interrupt_mask(&self) -> u8 {
        self.irq.mask()
    }

    pub fn int_line(&self) -> bool {
        self.irq.int_line()
    }

    // I/O

    pub fn port_in(&mut self, port: u8) -> u8 {
        self.leave_reset();
        let value = match decode_read(port) {
            PortRead::External(index) => self.ports.read(index),
            PortRead::UartData => {
                let data = self.uart.receive();
                self.uart.set_data_taken(false);
                self.uart.set_data_taken(true);
                self.uart_d7(data, data & 0x80 != 0)
            }
            PortRead::UartStatus => {
                let status = STATUS_BASE | self.uart.status().bits();
                self.uart_d7(status, self.uart.received_bit7())
            }
            PortRead::Unmapped => {
                tracing::trace!("[PORT] Invalid port {:02X} read", port);
                FILL_VALUE
            }
        };
        tracing::trace!("[PORT] IN {:02X} -> {:02X}", port, value);
        value
    }

    pub fn port_out(&mut self, port: u8, value: u8) {
        self.leave_reset();
        tracing::trace!("[PORT] OUT {:02X} <- {:02X}", port, value);
        match decode_write(port) {
            PortWrite::External(index) => self.emit(Signal::PortWrite(index, value)),
            PortWrite::UartData => self.uart.transmit(value),
            PortWrite::BankSelect if self.config.cpm_mod => {
                self.memory.select_bank(Bank::Expansion);
                self.state = ModuleState::RunningBanked;
            }
            PortWrite::BankSelect => {
                tracing::trace!("[PORT] Bank select without CP/M mod ignored");
            }
            PortWrite::Reserved => {
                tracing::trace!("[PORT] Reserved port {:02X} write = {:02X}", port, value);
            }
            PortWrite::Unmapped => {
                tracing::trace!("[PORT] Invalid port {:02X} write = {:02X}", port, value);
            }
        }
    }

    pub(crate) fn take_read_strobe(&mut self, index: usize) -> ReadByte {
        self.leave_reset();
        self.ports.take_read(index)
    }

    pub(crate) fn return_read_strobe(&mut self, port: u8, index: usize, strobe: ReadByte, value: u8) {
        self.ports.put_read(index, strobe);
        tracing::trace!("[PORT] IN {:02X} -> {:02X}", port, value);
    }

    // Output signals

    fn emit(&mut self, signal: Signal) {
        self.outbox.push_back(signal);
        if !self.deferred {
            self.deliver_signals();
        }
    }

    /// Drives every queued output in order. Only needed after calling into a
    /// shared module through a direct borrow.
    pub fn deliver_signals(&mut self) {
        while let Some(mut delivery) = self.take_delivery() {
            delivery.drive();
            self.finish_delivery(delivery);
        }
    }

    /// Next queued signal with its output lifted out. `None` while another
    /// delivery is in flight; that delivery's loop picks the signal up.
    pub(crate) fn take_delivery(&mut self) -> Option<Delivery> {
        if self.delivering {
            return None;
        }
        let signal = self.outbox.pop_front()?;
        self.delivering = true;
        Some(match signal {
            Signal::Int(state) => Delivery::Int(state, self.irq.take_int()),
            Signal::Iack(line) => Delivery::Iack(line, self.irq.take_iack(line)),
            Signal::PortWrite(index, value) => {
                Delivery::PortWrite(index, value, self.ports.take_write(index))
            }
        })
    }

    pub(crate) fn finish_delivery(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Int(_, output) => self.irq.put_int(output),
            Delivery::Iack(line, output) => self.irq.put_iack(line, output),
            Delivery::PortWrite(index, _, strobe) => self.ports.put_write(index, strobe),
        }
        self.delivering = false;
    }

    pub fn pending_signals(&self) -> usize {
        self.outbox.len()
    }

    // Memory

    pub fn read_byte(&self, address: u16) -> u8 {
        self.memory.read_byte(address)
    }

    pub fn write_byte(&mut self, address: u16, value: u8) {
        self.memory.write_byte(address, value);
    }

    // Serial line and switches

    pub fn rs232_rxd_w(&mut self, state: bool) {
        self.rxd = state;
        self.uart.set_serial_input(state);
    }

    pub fn rxd(&self) -> bool {
        self.rxd
    }

    pub fn set_uart_switches(&mut self, value: u16) {
        let switches = UartSwitches::new(value);
        if switches.value() == self.config.uart_switches {
            return;
        }
        self.config.uart_switches = switches.value();
        self.set_uart_state_from_switches();
    }

    fn set_uart_state_from_switches(&mut self) {
        let switches = self.config.switches();
        tracing::debug!(
            "[CPU] RS-232 switches {:03X}: {} baud",
            switches.value(),
            switches.baud_rate()
        );
        self.uart.configure(&switches.framing(), switches.clock_hz());
    }

    // Later boards put the live RXD level on D7 of every UART read.
    fn uart_d7(&self, value: u8, latched: bool) -> u8 {
        let d7 = match self.config.revision {
            BoardRevision::Early => latched,
            BoardRevision::Late => self.rxd,
        };
        (value & 0x7F) | if d7 { 0x80 } else { 0x00 }
    }

    fn leave_reset(&mut self) {
        if self.state == ModuleState::Reset {
            self.state = ModuleState::Running;
        }
    }

    // State

    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            interrupt_mask: self.irq.mask(),
            bank: self.memory.bank(),
            ram: *self.memory.ram_image(),
        }
    }

    pub fn restore(&mut self, snapshot: &CpuSnapshot) {
        self.irq.restore_mask(snapshot.interrupt_mask);
        self.emit(Signal::Int(self.irq.int_line()));
        self.memory.restore(snapshot.bank, &snapshot.ram);
        self.state = match snapshot.bank {
            Bank::Native => ModuleState::Running,
            Bank::Expansion => ModuleState::RunningBanked,
        };
    }
}

impl<U: Uart> fmt::Debug for CpuModule<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuModule")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("interrupt_mask", &format_args!("{:08b}", self.irq.mask()))
            .field("int", &self.irq.int_line())
            .field("bank", &self.memory.bank())
            .field("rxd", &self.rxd)
            .field("pending_signals", &self.outbox.len())
            .finish()
    }
}
