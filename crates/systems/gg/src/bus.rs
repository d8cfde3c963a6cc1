//! Game Gear memory and I/O bus
//!
//! I/O ports (reads):
//! - 0x00: START button (bit 7, active low) | region bits 0x60
//! - 0x01-0x06: serial and stereo registers, fixed values
//! - 0x40-0x7F: V counter (even) / latched H counter (odd)
//! - 0x80-0xBF: VDP data (even) / status (odd)
//! - 0xC0/0xDC: pad, 0xC1/0xDD: extension connector
//!
//! I/O ports (writes):
//! - 0x06: PSG stereo mask
//! - 0x07-0x3F: memory control (even, logged only) / I/O control (odd)
//! - 0x40-0x7F: PSG
//! - 0x80-0xBF: VDP data (even) / control (odd)
//!
//! Odd writes in 0x07-0x3F latch the H counter. The console ignores them;
//! the latch is an emulator extension so a host can sample H from software.

use crate::config::GgConfig;
use crate::controller::Controller;
use crate::host::Host;
use crate::mapper::MemoryMapper;
use crate::rom::Rom;
use crate::vdp::Vdp;
use emu_core::apu::Sn76489Psg;
use emu_core::cpu_z80::Z80Bus;
use emu_core::logging::{log, LogCategory, LogLevel};

/// Every chip behind the CPU
pub struct Chipset {
    pub mapper: MemoryMapper,
    pub vdp: Vdp,
    pub psg: Sn76489Psg,
    pub controller: Controller,
}

impl Chipset {
    pub fn new(rom: Rom, config: &GgConfig) -> Self {
        Self {
            mapper: MemoryMapper::new(rom),
            vdp: Vdp::new(config.sprite_limit),
            psg: Sn76489Psg::new(),
            controller: Controller::new(),
        }
    }

    pub fn reset(&mut self) {
        self.mapper.reset();
        self.vdp.reset();
        self.psg.reset();
    }

    /// Advance the clocked chips by one CPU step
    pub fn clock(&mut self, cycles: u32, host: &mut Host) {
        self.vdp.clock(cycles, host);
        self.psg.clock(cycles, host);
    }
}

/// CPU view of the chipset for the duration of one step
pub struct GgBus<'a> {
    pub chips: &'a mut Chipset,
    pub host: &'a mut Host,
}

impl<'a> GgBus<'a> {
    pub fn new(chips: &'a mut Chipset, host: &'a mut Host) -> Self {
        Self { chips, host }
    }

    fn memory_control(&mut self, data: u8) {
        // Only work RAM and BIOS enables are wired on the Game Gear
        if data & 0x10 == 0 {
            log(LogCategory::Mapper, LogLevel::Warn, || {
                format!("memory control {:02X}: work RAM disable not supported", data)
            });
        }
        if data & 0x08 == 0 {
            log(LogCategory::Mapper, LogLevel::Warn, || {
                format!("memory control {:02X}: BIOS mapping not supported", data)
            });
        }
    }
}

impl Z80Bus for GgBus<'_> {
    fn read(&mut self, addr: u16) -> u8 {
        self.chips.mapper.read(addr, self.host)
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.chips.mapper.write(addr, val, self.host)
    }

    fn io_read(&mut self, port: u8) -> u8 {
        let chips = &mut *self.chips;
        match port {
            0x00 => chips.controller.start_bit(self.host) | 0x60,
            0x01 => 0x7F,
            0x02 | 0x04 | 0x06 => 0xFF,
            0x03 | 0x05 => 0x00,
            0x07..=0x3F => 0xFF,
            0x40..=0x7F if port & 1 != 0 => chips.vdp.h_counter(),
            0x40..=0x7F => chips.vdp.read_v(self.host),
            0x80..=0xBF if port & 1 != 0 => chips.vdp.read_status(self.host),
            0x80..=0xBF => chips.vdp.read_data(),
            0xC0 | 0xDC => chips.controller.pad_port(self.host),
            0xC1 | 0xDD => chips.controller.ext_port(),
            _ => 0xFF,
        }
    }

    fn io_write(&mut self, port: u8, val: u8) {
        let chips = &mut *self.chips;
        match port {
            0x00..=0x05 => {}
            0x06 => chips.psg.write_stereo(val, self.host),
            0x07..=0x3F if port & 1 != 0 => chips.vdp.latch_h_counter(self.host),
            0x07..=0x3F => self.memory_control(val),
            0x40..=0x7F => chips.psg.write(val, self.host),
            0x80..=0xBF if port & 1 != 0 => chips.vdp.write_control(val, self.host),
            0x80..=0xBF => chips.vdp.write_data(val, self.host),
            _ => {}
        }
    }

    fn irq_line(&self) -> bool {
        self.chips.vdp.irq_line()
    }
}
