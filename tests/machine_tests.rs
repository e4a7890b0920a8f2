use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use tdv2100::{
    get_machine, signal::SharedLatch, Bank, BoardRevision, BusLine, ConfigError, CpuConfig,
    CpuModule, I8080Io, Io, MachineBuilder, MemoryLayout, ModuleState, Model,
};
use tracing_subscriber::fmt;

#[cfg(test)]
#[ctor::ctor]
fn init() {
    let fmt_subscriber = fmt::Subscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(fmt_subscriber)
        .expect("Unable to set global tracing subscriber");
}

fn rom_fixture() -> Vec<u8> {
    let mut rom = vec![0x00; 0x2000];
    rom[0x0000] = 0xC3;
    rom[0x0001] = 0x00;
    rom[0x0002] = 0x01;
    rom[0x1FFF] = 0x76;
    rom
}

#[test]
fn test_rst1_acknowledge() {
    let pulses = Rc::new(RefCell::new(Vec::new()));
    let log = pulses.clone();
    let machine = MachineBuilder::new()
        .rom(&rom_fixture())
        .iack(1, move |state: bool| log.borrow_mut().push(state))
        .build()
        .unwrap();

    machine.ireq_w(1, false);
    assert!(machine.cpu().int_line());

    let mut io = machine.io();
    assert_eq!(io.interrupt_acknowledge(), 0xCF);
    assert_eq!(*pulses.borrow(), vec![false, true]);

    // the requester still holds the line until it sees IACK
    assert!(machine.cpu().int_line());
    machine.ireq_w(1, true);
    assert!(!machine.cpu().int_line());
    assert_eq!(io.interrupt_acknowledge(), 0xC7);
    assert_eq!(pulses.borrow().len(), 2);
}

#[test]
fn test_int_output_follows_mask() {
    let int = Rc::new(RefCell::new(Vec::new()));
    let log = int.clone();
    let machine = MachineBuilder::new()
        .int_line(move |state: bool| log.borrow_mut().push(state))
        .build()
        .unwrap();

    int.borrow_mut().clear();
    machine.ireq_w(5, false);
    machine.ireq_w(6, false);
    machine.ireq_w(5, true);
    machine.ireq_w(6, true);

    assert_eq!(*int.borrow(), vec![true, true, true, false]);
}

#[test]
fn test_external_port_roundtrip() {
    let latch = SharedLatch::new(0x00);
    let machine = MachineBuilder::new()
        .port_write(0xE4, latch.sink())
        .port_read(0xE4, latch.source())
        .build()
        .unwrap();

    let mut io = machine.io();
    io.port_out(0xE4, 0x5A);
    assert_eq!(latch.get(), 0x5A);
    assert_eq!(io.port_in(0xE4), 0x5A);

    // unbound strobes float high
    assert_eq!(io.port_in(0xE5), 0xFF);
    assert_eq!(io.port_in(0x10), 0xFF);
}

#[test]
fn test_port_without_strobe_is_rejected() {
    let result = MachineBuilder::new()
        .port_write(0xF6, |_value: u8| {})
        .build();
    assert_eq!(result.unwrap_err(), ConfigError::NoStrobe(0xF6));
}

#[test]
fn test_native_bank_view() {
    let rom = rom_fixture();
    let machine = get_machine(&rom).unwrap();
    let mut io = machine.io();

    assert_eq!(io.read_byte(0x0000), 0xC3);
    assert_eq!(io.read_word(0x0001), 0x0100);
    assert_eq!(io.read_byte(0x1FFF), 0x76);

    io.write_byte(0x0000, 0x00);
    assert_eq!(io.read_byte(0x0000), 0xC3);

    io.write_byte(0x2000, 0x11);
    io.write_byte(0x27FF, 0x22);
    assert_eq!(io.read_byte(0x2000), 0x11);
    assert_eq!(io.read_byte(0x27FF), 0x22);

    // above the local RAM the view falls through to the backplane
    assert_eq!(io.read_byte(0x2800), 0xFF);
    io.write_byte(0x4000, 0x33);
    assert_eq!(io.read_byte(0x4000), 0x33);
    assert_eq!(machine.bus.borrow().read_byte(0x4000), 0x33);
}

#[test]
fn test_extended_layout() {
    let machine = MachineBuilder::new()
        .config(CpuConfig {
            layout: MemoryLayout::Extended,
            ..Default::default()
        })
        .build()
        .unwrap();
    let mut io = machine.io();

    io.write_byte(0x2FFF, 0x44);
    assert_eq!(io.read_byte(0x2FFF), 0x44);
    assert_eq!(io.read_byte(0x3000), 0xFF);
}

#[test]
fn test_cpm_bank_switch() {
    let mut machine = MachineBuilder::new()
        .rom(&rom_fixture())
        .config(CpuConfig {
            cpm_mod: true,
            ..Default::default()
        })
        .card_slot("sram_memory")
        .build()
        .unwrap();
    let mut io = machine.io();

    io.write_byte(0x2000, 0x55);
    io.write_byte(0x4000, 0x66);
    assert_eq!(machine.cpu().state(), ModuleState::Reset);

    io.port_out(0xF7, 0x00);
    assert_eq!(machine.cpu().bank(), Bank::Expansion);
    assert_eq!(machine.cpu().state(), ModuleState::RunningBanked);

    // ROM and local RAM are gone; nothing on the bus answers there
    assert_eq!(io.read_byte(0x0000), 0xFF);
    assert_eq!(io.read_byte(0x2000), 0xFF);
    assert_eq!(io.read_byte(0x4000), 0x66);

    machine.reset();
    assert_eq!(machine.cpu().bank(), Bank::Native);
    assert_eq!(machine.cpu().read_byte(0x0000), 0xC3);
    assert_eq!(machine.cpu().read_byte(0x2000), 0x55);
}

#[test]
fn test_bus_irq_lines_reach_cpu() {
    let machine = MachineBuilder::new().build().unwrap();

    for level in [2, 4, 5, 6, 7] {
        let line = BusLine::ireq(level).unwrap();
        assert!(machine.bus.borrow().is_line_bound(line));

        machine.bus.borrow_mut().write_line(line, false);
        assert_eq!(machine.cpu().interrupt_mask(), 1 << level);
        machine.bus.borrow_mut().write_line(line, true);
        assert_eq!(machine.cpu().interrupt_mask(), 0);
    }
}

#[test]
fn test_save_and_load_state() {
    let mut machine = MachineBuilder::new()
        .config(CpuConfig {
            cpm_mod: true,
            ..Default::default()
        })
        .build()
        .unwrap();
    {
        let mut io = machine.io();
        io.write_byte(0x2345, 0xAB);
        io.port_out(0xF7, 0x00);
    }
    machine.ireq_w(3, false);
    let state = machine.save_state().unwrap();

    machine.reset();
    assert_eq!(machine.cpu().bank(), Bank::Native);
    assert_eq!(machine.cpu().interrupt_mask(), 0);

    machine.load_state(&state).unwrap();
    assert_eq!(machine.cpu().bank(), Bank::Expansion);
    assert_eq!(machine.cpu().interrupt_mask(), 0b0000_1000);
    assert_eq!(machine.cpu().memory().ram()[0x345], 0xAB);
    assert!(machine.load_state("{}").is_err());
}

#[test]
fn test_unknown_card() {
    let result = MachineBuilder::new().card_slot("floppy").build();
    assert_eq!(
        result.unwrap_err(),
        ConfigError::UnknownCard("floppy".to_string())
    );
}

#[test]
fn test_memory_dump() {
    let machine = get_machine(&rom_fixture()).unwrap();
    let dump = machine.memory_dump(0x0000, 0x000F);
    assert!(dump.starts_with("0000: c3 00 01 00"));
    assert_eq!(dump.lines().count(), 1);
}

#[test]
fn test_model_without_rom() {
    let machine = MachineBuilder::new().model(Model::Tdv2124).build().unwrap();
    assert_eq!(machine.model(), Model::Tdv2124);
    assert_eq!(machine.cpu().read_byte(0x0000), 0xFF);
    assert_eq!(machine.cpu().state(), ModuleState::Reset);
}

#[test]
fn test_uart_bit7_by_revision() {
    for (revision, expected) in [(BoardRevision::Early, 0x80), (BoardRevision::Late, 0x00)] {
        let machine = MachineBuilder::new()
            .config(CpuConfig {
                revision,
                ..Default::default()
            })
            .build()
            .unwrap();
        {
            let mut cpu = machine.cpu.borrow_mut();
            cpu.uart_mut().push_received(0xAA);
            cpu.rs232_rxd_w(false);
        }

        let mut io = machine.io();
        assert_eq!(io.port_in(0xF5) & 0x80, expected, "{:?} status", revision);
        assert_eq!(io.port_in(0xF4), 0x2A | expected, "{:?} data", revision);
    }
}

// Devices only get a handle on the CPU card once the machine exists.
type CpuHandle = Rc<RefCell<Weak<RefCell<CpuModule>>>>;

fn with_cpu(handle: &CpuHandle, f: impl FnOnce(&mut CpuModule)) {
    if let Some(cpu) = handle.borrow().upgrade() {
        f(&mut cpu.borrow_mut());
    }
}

#[test]
fn test_iack_releases_request_during_pulse() {
    let handle = CpuHandle::default();
    let device = handle.clone();
    let int = Rc::new(RefCell::new(Vec::new()));
    let log = int.clone();
    let machine = MachineBuilder::new()
        .iack(1, move |state: bool| {
            if state {
                with_cpu(&device, |cpu| cpu.ireq_w(1, true));
            }
        })
        .int_line(move |state: bool| log.borrow_mut().push(state))
        .build()
        .unwrap();
    *handle.borrow_mut() = Rc::downgrade(&machine.cpu);

    machine.ireq_w(1, false);
    int.borrow_mut().clear();

    let mut io = machine.io();
    assert_eq!(io.interrupt_acknowledge(), 0xCF);
    assert!(!machine.cpu().int_line());
    assert_eq!(machine.cpu().interrupt_mask(), 0);
    assert_eq!(machine.cpu().pending_signals(), 0);
    assert_eq!(*int.borrow(), vec![false]);
}

#[test]
fn test_int_sink_acknowledges_synchronously() {
    let handle = CpuHandle::default();
    let core = handle.clone();
    let vectors = Rc::new(RefCell::new(Vec::new()));
    let seen = vectors.clone();
    let pulses = Rc::new(RefCell::new(0));
    let counter = pulses.clone();
    let machine = MachineBuilder::new()
        .int_line(move |state: bool| {
            if let (true, Some(cpu)) = (state, core.borrow().upgrade()) {
                seen.borrow_mut().push(Io::new(cpu).interrupt_acknowledge());
            }
        })
        .iack(3, move |state: bool| {
            if !state {
                *counter.borrow_mut() += 1;
            }
        })
        .build()
        .unwrap();
    *handle.borrow_mut() = Rc::downgrade(&machine.cpu);

    machine.ireq_w(3, false);

    assert_eq!(*vectors.borrow(), vec![0xDF]);
    assert_eq!(*pulses.borrow(), 1);
}

#[test]
fn test_port_write_raises_request() {
    let handle = CpuHandle::default();
    let device = handle.clone();
    let machine = MachineBuilder::new()
        .port_write(0xE5, move |value: u8| {
            with_cpu(&device, |cpu| cpu.ireq_w(3, value != 0));
        })
        .build()
        .unwrap();
    *handle.borrow_mut() = Rc::downgrade(&machine.cpu);

    let mut io = machine.io();
    io.port_out(0xE5, 0x00);
    assert!(machine.cpu().int_line());
    assert_eq!(machine.cpu().interrupt_mask(), 0b0000_1000);

    io.port_out(0xE5, 0x01);
    assert!(!machine.cpu().int_line());
}

#[test]
fn test_keyboard_read_clears_request() {
    let handle = CpuHandle::default();
    let device = handle.clone();
    let machine = MachineBuilder::new()
        .port_read(0xE4, move || {
            with_cpu(&device, |cpu| cpu.ireq_w(1, true));
            0x41
        })
        .build()
        .unwrap();
    *handle.borrow_mut() = Rc::downgrade(&machine.cpu);

    machine.ireq_w(1, false);
    let mut io = machine.io();
    assert_eq!(io.port_in(0xE4), 0x41);
    assert!(!machine.cpu().int_line());
    assert_eq!(machine.cpu().state(), ModuleState::Running);
}
