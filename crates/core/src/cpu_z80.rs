//! Zilog Z80 processor interface
//!
//! Systems drive a processor through [`Processor`] and expose their memory
//! and I/O space to it through [`Z80Bus`]. The bus is handed in on every
//! step, so the system keeps ownership of its chipset.
//!
//! [`CpuZ80`] is a small reference core: it covers the control flow, port
//! and accumulator load/store instructions needed to drive a chipset from a
//! hand-written program, plus interrupt acceptance in all three modes. It is
//! not a complete Z80.

use crate::logging::{log, LogCategory, LogLevel};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Memory and I/O interface seen by the processor
pub trait Z80Bus {
    /// Read a byte from memory
    fn read(&mut self, addr: u16) -> u8;

    /// Write a byte to memory
    fn write(&mut self, addr: u16, val: u8);

    /// Read from I/O port
    fn io_read(&mut self, port: u8) -> u8 {
        let _ = port;
        0xFF
    }

    /// Write to I/O port
    fn io_write(&mut self, port: u8, val: u8) {
        let _ = (port, val);
    }

    /// Level of the maskable interrupt line
    fn irq_line(&self) -> bool {
        false
    }

    /// Byte placed on the data bus during interrupt acknowledge
    fn irq_data(&self) -> u8 {
        0xFF
    }
}

/// What the next processor step will be
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CpuStep {
    /// An instruction fetched from `address`
    Instruction { address: u16, bytes: Vec<u8> },
    /// Non-maskable interrupt acceptance
    Nmi { address: u16 },
    /// Maskable interrupt acceptance in the given mode
    Irq { address: u16, mode: u8, data: u8 },
}

/// A clocked instruction processor
pub trait Processor {
    /// Serializable register file
    type State: Serialize + DeserializeOwned + Clone + Debug;

    /// Return to power-on state
    fn reset(&mut self);

    /// Execute one instruction or interrupt acceptance, returning CPU cycles
    fn step<B: Z80Bus>(&mut self, bus: &mut B) -> u32;

    /// Describe the step [`Processor::step`] would perform next
    fn peek_step<B: Z80Bus>(&self, bus: &mut B) -> CpuStep;

    fn state(&self) -> Self::State;

    /// Structural checks applied before a state is restored
    fn validate_state(state: &Self::State) -> Result<(), String> {
        let _ = state;
        Ok(())
    }

    fn restore_state(&mut self, state: Self::State);
}

/// Zilog Z80 register file and reference execution core
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuZ80 {
    /// Main registers
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,

    /// Index registers
    pub ix: u16,
    pub iy: u16,

    /// Interrupt vector base
    pub i: u8,
    /// Memory refresh
    pub r: u8,

    pub sp: u16,
    pub pc: u16,

    /// Interrupt flags
    pub iff1: bool,
    pub iff2: bool,
    /// Interrupt mode (0, 1, or 2)
    pub im: u8,
    /// Interrupts stay blocked for one instruction after EI
    pub ei_delay: bool,

    pub halted: bool,
    pub cycles: u64,
}

/// Length in bytes of an instruction starting with `opcode`
fn instruction_len(opcode: u8) -> usize {
    match opcode {
        0x06 | 0x0E | 0x10 | 0x18 | 0x3E | 0xD3 | 0xDB | 0xED => 2,
        0x31 | 0x32 | 0x3A | 0xC3 | 0xCD => 3,
        _ => 1,
    }
}

impl CpuZ80 {
    /// Create a new Z80 CPU
    pub fn new() -> Self {
        Self {
            sp: 0xFFFF,
            ..Default::default()
        }
    }

    fn fetch<B: Z80Bus>(&mut self, bus: &mut B) -> u8 {
        let val = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        self.r = (self.r & 0x80) | (self.r.wrapping_add(1) & 0x7F);
        val
    }

    fn fetch_word<B: Z80Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch(bus) as u16;
        let hi = self.fetch(bus) as u16;
        lo | (hi << 8)
    }

    fn push<B: Z80Bus>(&mut self, bus: &mut B, val: u16) {
        self.sp = self.sp.wrapping_sub(1);
        bus.write(self.sp, (val >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        bus.write(self.sp, val as u8);
    }

    fn pop<B: Z80Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = bus.read(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        let hi = bus.read(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        lo | (hi << 8)
    }

    fn irq_accepted<B: Z80Bus>(&self, bus: &B) -> bool {
        self.iff1 && !self.ei_delay && bus.irq_line()
    }

    fn accept_irq<B: Z80Bus>(&mut self, bus: &mut B) -> u32 {
        let data = bus.irq_data();
        self.halted = false;
        self.iff1 = false;
        self.iff2 = false;
        self.r = (self.r & 0x80) | (self.r.wrapping_add(1) & 0x7F);
        let ret = self.pc;
        self.push(bus, ret);
        log(LogCategory::CPU, LogLevel::Trace, || {
            format!("IRQ accepted in IM {} at {:04X}", self.im, ret)
        });
        match self.im {
            2 => {
                let vector = ((self.i as u16) << 8) | data as u16;
                let lo = bus.read(vector) as u16;
                let hi = bus.read(vector.wrapping_add(1)) as u16;
                self.pc = lo | (hi << 8);
                19
            }
            // Mode 0 executes the byte on the bus; the chipset drives RST 38h
            _ => {
                self.pc = 0x0038;
                13
            }
        }
    }

    fn execute_ed<B: Z80Bus>(&mut self, bus: &mut B) -> u32 {
        let op = self.fetch(bus);
        match op {
            0x46 => {
                self.im = 0;
                8
            }
            0x56 => {
                self.im = 1;
                8
            }
            0x5E => {
                self.im = 2;
                8
            }
            // RETN / RETI
            0x45 | 0x4D => {
                self.iff1 = self.iff2;
                self.pc = self.pop(bus);
                14
            }
            _ => {
                log(LogCategory::CPU, LogLevel::Warn, || {
                    format!(
                        "unimplemented opcode ED {:02X} at {:04X}",
                        op,
                        self.pc.wrapping_sub(2)
                    )
                });
                8
            }
        }
    }

    fn execute<B: Z80Bus>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        match opcode {
            0x00 => 4, // NOP
            0x06 => {
                self.b = self.fetch(bus);
                7
            }
            0x0E => {
                self.c = self.fetch(bus);
                7
            }
            // DJNZ e
            0x10 => {
                let disp = self.fetch(bus) as i8;
                self.b = self.b.wrapping_sub(1);
                if self.b != 0 {
                    self.pc = self.pc.wrapping_add(disp as u16);
                    13
                } else {
                    8
                }
            }
            // JR e
            0x18 => {
                let disp = self.fetch(bus) as i8;
                self.pc = self.pc.wrapping_add(disp as u16);
                12
            }
            0x31 => {
                self.sp = self.fetch_word(bus);
                10
            }
            // LD (nn),A
            0x32 => {
                let addr = self.fetch_word(bus);
                bus.write(addr, self.a);
                13
            }
            // LD A,(nn)
            0x3A => {
                let addr = self.fetch_word(bus);
                self.a = bus.read(addr);
                13
            }
            0x3E => {
                self.a = self.fetch(bus);
                7
            }
            0x76 => {
                self.halted = true;
                4
            }
            0xC3 => {
                self.pc = self.fetch_word(bus);
                10
            }
            0xC9 => {
                self.pc = self.pop(bus);
                10
            }
            0xCD => {
                let target = self.fetch_word(bus);
                let ret = self.pc;
                self.push(bus, ret);
                self.pc = target;
                17
            }
            // OUT (n),A
            0xD3 => {
                let port = self.fetch(bus);
                bus.io_write(port, self.a);
                11
            }
            // IN A,(n)
            0xDB => {
                let port = self.fetch(bus);
                self.a = bus.io_read(port);
                11
            }
            0xED => self.execute_ed(bus),
            0xF3 => {
                self.iff1 = false;
                self.iff2 = false;
                4
            }
            0xFB => {
                self.iff1 = true;
                self.iff2 = true;
                self.ei_delay = true;
                4
            }
            _ => {
                log(LogCategory::CPU, LogLevel::Warn, || {
                    format!(
                        "unimplemented opcode {:02X} at {:04X}",
                        opcode,
                        self.pc.wrapping_sub(1)
                    )
                });
                4
            }
        }
    }
}

impl Processor for CpuZ80 {
    type State = CpuZ80;

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn step<B: Z80Bus>(&mut self, bus: &mut B) -> u32 {
        let cycles = if self.irq_accepted(bus) {
            self.accept_irq(bus)
        } else if self.halted {
            self.ei_delay = false;
            4
        } else {
            self.ei_delay = false;
            let opcode = self.fetch(bus);
            self.execute(bus, opcode)
        };
        self.cycles += cycles as u64;
        cycles
    }

    fn peek_step<B: Z80Bus>(&self, bus: &mut B) -> CpuStep {
        if self.irq_accepted(bus) {
            return CpuStep::Irq {
                address: self.pc,
                mode: self.im,
                data: bus.irq_data(),
            };
        }
        let len = instruction_len(bus.read(self.pc));
        let bytes = (0..len as u16)
            .map(|i| bus.read(self.pc.wrapping_add(i)))
            .collect();
        CpuStep::Instruction {
            address: self.pc,
            bytes,
        }
    }

    fn state(&self) -> Self::State {
        self.clone()
    }

    fn validate_state(state: &Self::State) -> Result<(), String> {
        if state.im > 2 {
            return Err(format!("interrupt mode {} out of range", state.im));
        }
        Ok(())
    }

    fn restore_state(&mut self, state: Self::State) {
        *self = state;
    }
}
