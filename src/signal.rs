//! Bindable single-bit and single-byte signals.
//!
//! Devices in this machine talk to each other through strobes and latches
//! rather than shared registers. Each signal is a one-method contract; the
//! owning device holds an optional binding and falls back to the floating-bus
//! behaviour when nothing is attached (reads return [`FILL_VALUE`], writes
//! are dropped).

use std::{cell::Cell, fmt, rc::Rc};

/// Value read from an undriven data bus.
pub const FILL_VALUE: u8 = 0xFF;

pub trait LineSink {
    fn on_line_change(&mut self, state: bool);
}

pub trait ByteSink {
    fn on_byte_write(&mut self, value: u8);
}

pub trait ByteSource {
    fn on_byte_read(&mut self) -> u8;
}

impl<F: FnMut(bool)> LineSink for F {
    fn on_line_change(&mut self, state: bool) {
        self(state)
    }
}

impl<F: FnMut(u8)> ByteSink for F {
    fn on_byte_write(&mut self, value: u8) {
        self(value)
    }
}

impl<F: FnMut() -> u8> ByteSource for F {
    fn on_byte_read(&mut self) -> u8 {
        self()
    }
}

/// Output line; unbound lines swallow writes.
#[derive(Default)]
pub struct WriteLine(Option<Box<dyn LineSink>>);

impl WriteLine {
    pub fn bind(&mut self, sink: impl LineSink + 'static) {
        self.0 = Some(Box::new(sink));
    }

    pub fn is_bound(&self) -> bool {
        self.0.is_some()
    }

    pub fn write(&mut self, state: bool) {
        if let Some(sink) = &mut self.0 {
            sink.on_line_change(state);
        }
    }

    /// Drives the line low then high, the way an acknowledge strobe is pulsed.
    pub fn pulse_low(&mut self) {
        self.write(false);
        self.write(true);
    }
}

impl fmt::Debug for WriteLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WriteLine({})", bound_label(self.is_bound()))
    }
}

#[derive(Default)]
pub struct WriteByte(Option<Box<dyn ByteSink>>);

impl WriteByte {
    pub fn bind(&mut self, sink: impl ByteSink + 'static) {
        self.0 = Some(Box::new(sink));
    }

    pub fn is_bound(&self) -> bool {
        self.0.is_some()
    }

    pub fn write(&mut self, value: u8) {
        if let Some(sink) = &mut self.0 {
            sink.on_byte_write(value);
        }
    }
}

impl fmt::Debug for WriteByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WriteByte({})", bound_label(self.is_bound()))
    }
}

#[derive(Default)]
pub struct ReadByte(Option<Box<dyn ByteSource>>);

impl ReadByte {
    pub fn bind(&mut self, source: impl ByteSource + 'static) {
        self.0 = Some(Box::new(source));
    }

    pub fn is_bound(&self) -> bool {
        self.0.is_some()
    }

    pub fn read(&mut self) -> u8 {
        match &mut self.0 {
            Some(source) => source.on_byte_read(),
            None => FILL_VALUE,
        }
    }
}

impl fmt::Debug for ReadByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReadByte({})", bound_label(self.is_bound()))
    }
}

fn bound_label(bound: bool) -> &'static str {
    if bound {
        "bound"
    } else {
        "unbound"
    }
}

/// A byte latch that can sit on both ends of a port: the CPU writes it
/// through [`SharedLatch::sink`] and reads it back through
/// [`SharedLatch::source`].
#[derive(Debug, Clone, Default)]
pub struct SharedLatch(Rc<Cell<u8>>);

impl SharedLatch {
    pub fn new(initial: u8) -> Self {
        Self(Rc::new(Cell::new(initial)))
    }

    pub fn get(&self) -> u8 {
        self.0.get()
    }

    pub fn set(&self, value: u8) {
        self.0.set(value);
    }

    pub fn sink(&self) -> impl ByteSink + 'static {
        let cell = self.0.clone();
        move |value: u8| cell.set(value)
    }

    pub fn source(&self) -> impl ByteSource + 'static {
        let cell = self.0.clone();
        move || cell.get()
    }
}
