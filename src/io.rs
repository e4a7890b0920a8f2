use std::{cell::RefCell, rc::Rc};

use crate::{
    cpu::CpuModule,
    interrupt::RST_BASE,
    ports::{decode_read, PortRead},
    signal::FILL_VALUE,
    uart::{LatchedUart, Uart},
};

/// What an 8080 core needs from the board it is plugged into.
pub trait I8080Io {
    fn read_byte(&self, address: u16) -> u8;
    fn write_byte(&mut self, address: u16, value: u8);

    fn port_in(&mut self, _port: u8) -> u8 {
        FILL_VALUE
    }

    fn port_out(&mut self, _port: u8, _value: u8) {}

    /// Opcode jammed onto the data bus during INTA.
    fn interrupt_acknowledge(&mut self) -> u8 {
        RST_BASE
    }

    fn read_word(&self, address: u16) -> u16 {
        let low_byte = self.read_byte(address) as u16;
        let high_byte = self.read_byte(address.wrapping_add(1)) as u16;
        (high_byte << 8) | low_byte
    }
}

impl<U: Uart> I8080Io for CpuModule<U> {
    fn read_byte(&self, address: u16) -> u8 {
        CpuModule::read_byte(self, address)
    }

    fn write_byte(&mut self, address: u16, value: u8) {
        CpuModule::write_byte(self, address, value)
    }

    fn port_in(&mut self, port: u8) -> u8 {
        CpuModule::port_in(self, port)
    }

    fn port_out(&mut self, port: u8, value: u8) {
        CpuModule::port_out(self, port, value)
    }

    fn interrupt_acknowledge(&mut self) -> u8 {
        self.acknowledge()
    }

    fn read_word(&self, address: u16) -> u16 {
        self.memory().read_word(address)
    }
}

/// Drives the module's queued outputs with no borrow of it held, so a sink
/// may call straight back into the module. Signals raised by those calls
/// join the queue and are driven by the same loop.
pub fn deliver<U: Uart>(cpu: &RefCell<CpuModule<U>>) {
    loop {
        let next = cpu.borrow_mut().take_delivery();
        let Some(mut delivery) = next else {
            return;
        };
        delivery.drive();
        cpu.borrow_mut().finish_delivery(delivery);
    }
}

/// Shared handle for cores that keep their own reference to the board.
pub struct Io<U: Uart = LatchedUart> {
    pub cpu: Rc<RefCell<CpuModule<U>>>,
}

impl<U: Uart> Io<U> {
    pub fn new(cpu: Rc<RefCell<CpuModule<U>>>) -> Self {
        cpu.borrow_mut().defer_signals();
        Io { cpu }
    }

    fn with_module<R>(&self, f: impl FnOnce(&mut CpuModule<U>) -> R) -> R {
        let result = {
            let mut cpu = self.cpu.borrow_mut();
            f(&mut *cpu)
        };
        deliver(&self.cpu);
        result
    }
}

impl<U: Uart> I8080Io for Io<U> {
    fn read_byte(&self, address: u16) -> u8 {
        self.cpu.borrow().read_byte(address)
    }

    fn write_byte(&mut self, address: u16, value: u8) {
        self.cpu.borrow_mut().write_byte(address, value)
    }

    fn port_in(&mut self, port: u8) -> u8 {
        let PortRead::External(index) = decode_read(port) else {
            return self.with_module(|cpu| cpu.port_in(port));
        };

        // the source may be a device that calls back into the module
        let mut strobe = self.cpu.borrow_mut().take_read_strobe(index);
        let value = strobe.read();
        self.with_module(|cpu| cpu.return_read_strobe(port, index, strobe, value));
        value
    }

    fn port_out(&mut self, port: u8, value: u8) {
        self.with_module(|cpu| cpu.port_out(port, value))
    }

    fn interrupt_acknowledge(&mut self) -> u8 {
        self.with_module(|cpu| cpu.acknowledge())
    }

    fn read_word(&self, address: u16) -> u16 {
        self.cpu.borrow().memory().read_word(address)
    }
}
