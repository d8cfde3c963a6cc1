//! Sega mapper: banked ROM, on-board RAM and cartridge RAM paging
//!
//! Memory map:
//! - 0x0000-0x03FF: first 1 KiB of bank 0, never paged
//! - 0x0400-0x3FFF: bank register 0
//! - 0x4000-0x7FFF: bank register 1
//! - 0x8000-0xBFFF: bank register 2, or a 16 KiB window of cartridge RAM
//! - 0xC000-0xFFFF: 8 KiB work RAM (mirrored), or cartridge RAM
//!
//! Control registers live at 0xFFFC-0xFFFF and are written through to RAM.

use crate::host::{Host, MemAccess};
use crate::rom::Rom;
use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

pub const RAM_SIZE: usize = 0x2000;
pub const EXTERNAL_RAM_SIZE: usize = 0x8000;

const SHIFTS: [u8; 4] = [0x00, 0x18, 0x10, 0x08];

/// Everything the mapper persists in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapperState {
    ram: Vec<u8>,
    external_ram: Option<Vec<u8>>,
    onboard: bool,
    slot2: bool,
    slot2_offset: u16,
    bank_count: u32,
    banks: [u32; 3],
    shift: u8,
}

impl MapperState {
    fn power_on(bank_count: u32) -> Self {
        let banks = match bank_count {
            1 => [0, 0, 0],
            2 => [0, 1, 1],
            _ => [0, 1, 2],
        };
        Self {
            ram: vec![0; RAM_SIZE],
            external_ram: None,
            onboard: false,
            slot2: false,
            slot2_offset: 0,
            bank_count,
            banks,
            shift: 0,
        }
    }
}

/// Bank registers as seen by a debugger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankInfo {
    pub banks: [u32; 3],
    pub shift: u8,
}

/// Memory mapper for one loaded cartridge
pub struct MemoryMapper {
    rom: Rom,
    state: MapperState,
    trace: bool,
}

impl MemoryMapper {
    pub fn new(rom: Rom) -> Self {
        let state = MapperState::power_on(rom.bank_count());
        Self {
            rom,
            state,
            trace: false,
        }
    }

    pub fn reset(&mut self) {
        self.state = MapperState::power_on(self.rom.bank_count());
    }

    pub fn rom(&self) -> &Rom {
        &self.rom
    }

    /// Report RAM accesses and paging writes to the trace sink
    pub fn set_trace(&mut self, enabled: bool) {
        self.trace = enabled;
    }

    pub fn read(&self, addr: u16, host: &mut Host) -> u8 {
        if self.trace && addr >= 0xC000 && !self.state.onboard {
            let offset = addr & 0x1FFF;
            host.trace_mem(MemAccess::Read, offset, self.state.ram[offset as usize]);
        }
        self.read_direct(addr)
    }

    fn read_direct(&self, addr: u16) -> u8 {
        let offset = addr & 0x3FFF;
        match addr >> 14 {
            0 if offset < 0x400 => self.rom.read(0, offset),
            0 => self.rom.read(self.state.banks[0], offset),
            1 => self.rom.read(self.state.banks[1], offset),
            2 => match (&self.state.external_ram, self.state.slot2) {
                (Some(sram), true) => sram[(self.state.slot2_offset + offset) as usize],
                _ => self.rom.read(self.state.banks[2], offset),
            },
            _ => match (&self.state.external_ram, self.state.onboard) {
                (Some(sram), true) => sram[offset as usize],
                _ => self.state.ram[(addr & 0x1FFF) as usize],
            },
        }
    }

    pub fn write(&mut self, addr: u16, val: u8, host: &mut Host) {
        if self.trace && addr >= 0xC000 {
            if !self.state.onboard {
                host.trace_mem(MemAccess::Write, addr & 0x1FFF, val);
            }
            if addr >= 0xFFFC {
                host.trace_mapper_changed();
            }
        }

        let state = &mut self.state;
        if addr < 0xC000 {
            if addr >= 0x8000 && state.slot2 {
                if let Some(sram) = state.external_ram.as_mut() {
                    sram[(state.slot2_offset + (addr & 0x3FFF)) as usize] = val;
                }
            }
            return;
        }

        match (state.external_ram.as_mut(), state.onboard) {
            (Some(sram), true) => sram[(addr & 0x3FFF) as usize] = val,
            _ => state.ram[(addr & 0x1FFF) as usize] = val,
        }

        match addr {
            0xFFFC => self.write_control(val, host),
            0xFFFD..=0xFFFF => {
                let slot = (addr - 0xFFFD) as usize;
                let bank = (val as u32 + self.state.shift as u32) % self.state.bank_count;
                self.state.banks[slot] = bank;
                log(LogCategory::Mapper, LogLevel::Debug, || {
                    format!("slot {} -> bank {}", slot, bank)
                });
            }
            _ => {}
        }
    }

    fn write_control(&mut self, val: u8, host: &mut Host) {
        self.state.onboard = val & 0x10 != 0;
        self.state.slot2 = val & 0x08 != 0;
        if self.state.slot2 {
            self.state.slot2_offset = if val & 0x04 != 0 { 0x4000 } else { 0 };
        }
        if (self.state.onboard || self.state.slot2) && self.state.external_ram.is_none() {
            let mut sram = host.acquire_external_ram();
            sram.resize(EXTERNAL_RAM_SIZE, 0);
            self.state.external_ram = Some(sram);
            log(LogCategory::Mapper, LogLevel::Debug, || {
                "cartridge RAM attached".to_string()
            });
        }
        self.state.shift = SHIFTS[(val & 0x03) as usize];
        log(LogCategory::Mapper, LogLevel::Debug, || {
            format!(
                "control {:02X}: onboard={} slot2={} shift={:02X}",
                val, self.state.onboard, self.state.slot2, self.state.shift
            )
        });
    }

    pub fn active_banks(&self) -> BankInfo {
        BankInfo {
            banks: self.state.banks,
            shift: self.state.shift,
        }
    }

    /// Cartridge RAM, once the program has paged it in
    pub fn external_ram(&self) -> Option<&[u8]> {
        self.state.external_ram.as_deref()
    }

    pub fn mapper_state(&self) -> &MapperState {
        &self.state
    }

    /// Structural checks on a decoded state against the loaded ROM
    pub fn validate(&self, state: &MapperState) -> Result<(), String> {
        if state.ram.len() != RAM_SIZE {
            return Err(format!("RAM is {} bytes", state.ram.len()));
        }
        match &state.external_ram {
            Some(sram) if sram.len() != EXTERNAL_RAM_SIZE => {
                return Err(format!("cartridge RAM is {} bytes", sram.len()));
            }
            None if state.onboard || state.slot2 => {
                return Err("cartridge RAM paged in but missing".to_string());
            }
            _ => {}
        }
        if state.slot2_offset != 0 && state.slot2_offset != 0x4000 {
            return Err(format!("slot 2 offset {:04X}", state.slot2_offset));
        }
        if state.bank_count != self.rom.bank_count() {
            return Err(format!(
                "saved for {} banks, ROM has {}",
                state.bank_count,
                self.rom.bank_count()
            ));
        }
        if let Some(bank) = state.banks.iter().find(|&&b| b >= state.bank_count) {
            return Err(format!("bank {} out of range", bank));
        }
        if !SHIFTS.contains(&state.shift) {
            return Err(format!("shift {:02X}", state.shift));
        }
        Ok(())
    }

    /// Install a state previously accepted by [`MemoryMapper::validate`]
    pub fn restore(&mut self, state: MapperState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rom::BANK_SIZE;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Each bank filled with its own index
    fn mapper_with_banks(banks: usize) -> MemoryMapper {
        let mut image = vec![0u8; banks * BANK_SIZE];
        for (i, bank) in image.chunks_mut(BANK_SIZE).enumerate() {
            bank.fill(i as u8);
        }
        MemoryMapper::new(Rom::new(&image).unwrap())
    }

    #[test]
    fn test_power_on_banks() {
        let mut host = Host::new();
        let one = mapper_with_banks(1);
        assert_eq!(one.active_banks().banks, [0, 0, 0]);

        let two = mapper_with_banks(2);
        assert_eq!(two.active_banks().banks, [0, 1, 1]);
        assert_eq!(two.read(0x8000, &mut host), 1);

        let four = mapper_with_banks(4);
        assert_eq!(four.active_banks().banks, [0, 1, 2]);
        assert_eq!(four.read(0xBFFF, &mut host), 2);
    }

    #[test]
    fn test_bank_select_with_shift() {
        let mut host = Host::new();
        let mut mapper = mapper_with_banks(8);

        mapper.write(0xFFFF, 5, &mut host);
        assert_eq!(mapper.read(0x8123, &mut host), 5);

        // Shift 0x08 with 8 banks wraps back onto the same index
        mapper.write(0xFFFC, 0x03, &mut host);
        mapper.write(0xFFFE, 3, &mut host);
        assert_eq!(mapper.active_banks().banks[1], (3 + 0x08) % 8);
        assert_eq!(mapper.read(0x4000, &mut host), 3);

        // Writes are mirrored into RAM
        assert_eq!(mapper.read(0xDFFE, &mut host), 3);
    }

    #[test]
    fn test_first_kilobyte_is_fixed() {
        let mut host = Host::new();
        let mut mapper = mapper_with_banks(4);
        mapper.write(0xFFFD, 3, &mut host);
        assert_eq!(mapper.read(0x03FF, &mut host), 0);
        assert_eq!(mapper.read(0x0400, &mut host), 3);
    }

    #[test]
    fn test_rom_writes_ignored_and_ram_mirrored() {
        let mut host = Host::new();
        let mut mapper = mapper_with_banks(2);
        mapper.write(0x4000, 0x55, &mut host);
        assert_eq!(mapper.read(0x4000, &mut host), 1);

        mapper.write(0xC010, 0x42, &mut host);
        assert_eq!(mapper.read(0xE010, &mut host), 0x42);
    }

    #[test]
    fn test_external_ram_paging() {
        let acquired = Rc::new(RefCell::new(0));
        let a = Rc::clone(&acquired);
        let mut host = Host::new().with_external_ram(move || {
            *a.borrow_mut() += 1;
            vec![0xEE; 16]
        });
        let mut mapper = mapper_with_banks(4);
        assert!(mapper.external_ram().is_none());

        // Slot 2, upper half
        mapper.write(0xFFFC, 0x0C, &mut host);
        assert_eq!(*acquired.borrow(), 1);
        assert_eq!(mapper.external_ram().unwrap().len(), EXTERNAL_RAM_SIZE);
        assert_eq!(mapper.read(0x8000, &mut host), 0x00);
        mapper.write(0x8001, 0x77, &mut host);
        assert_eq!(mapper.external_ram().unwrap()[0x4001], 0x77);

        // Lower half keeps the provider's contents
        mapper.write(0xFFFC, 0x08, &mut host);
        assert_eq!(mapper.read(0x8005, &mut host), 0xEE);

        // On-board mapping, no second acquisition
        mapper.write(0xFFFC, 0x10, &mut host);
        mapper.write(0xC003, 0x99, &mut host);
        assert_eq!(mapper.external_ram().unwrap()[3], 0x99);
        assert_eq!(mapper.read(0xC003, &mut host), 0x99);
        assert_eq!(mapper.read(0x8000, &mut host), 2);
        assert_eq!(*acquired.borrow(), 1);
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<(MemAccess, u16, u8)>,
        mapper_changes: usize,
    }

    struct SharedRecorder(Rc<RefCell<Recorder>>);

    impl crate::host::TraceSink for SharedRecorder {
        fn mapper_changed(&mut self) {
            self.0.borrow_mut().mapper_changes += 1;
        }

        fn mem_access(&mut self, access: MemAccess, offset: u16, data: u8) {
            self.0.borrow_mut().events.push((access, offset, data));
        }
    }

    #[test]
    fn test_trace_mode_reports_ram_accesses() {
        let rec = Rc::new(RefCell::new(Recorder::default()));
        let mut host = Host::new().with_trace(SharedRecorder(Rc::clone(&rec)));
        let mut mapper = mapper_with_banks(2);

        // Untraced accesses stay silent
        mapper.write(0xC000, 1, &mut host);
        assert!(rec.borrow().events.is_empty());

        mapper.set_trace(true);
        mapper.write(0xE001, 0x22, &mut host);
        mapper.read(0xC001, &mut host);
        mapper.read(0x1000, &mut host);
        mapper.write(0xFFFE, 1, &mut host);

        let rec = rec.borrow();
        assert_eq!(
            rec.events,
            vec![
                (MemAccess::Write, 0x0001, 0x22),
                (MemAccess::Read, 0x0001, 0x22),
                (MemAccess::Write, 0x1FFE, 1),
            ]
        );
        assert_eq!(rec.mapper_changes, 1);
    }

    #[test]
    fn test_validate_rejects_inconsistent_state() {
        let mut host = Host::new();
        let mut mapper = mapper_with_banks(4);
        mapper.write(0xFFFF, 3, &mut host);
        let good = mapper.mapper_state().clone();
        assert!(mapper.validate(&good).is_ok());

        let mut bad = good.clone();
        bad.banks[2] = 4;
        assert!(mapper.validate(&bad).is_err());

        let mut bad = good.clone();
        bad.onboard = true;
        assert!(mapper.validate(&bad).is_err());

        let mut bad = good.clone();
        bad.shift = 0x04;
        assert!(mapper.validate(&bad).is_err());

        let mut bad = good;
        bad.bank_count = 8;
        assert!(mapper.validate(&bad).is_err());

        let other = mapper_with_banks(2);
        assert!(other.validate(mapper.mapper_state()).is_err());
    }
}
