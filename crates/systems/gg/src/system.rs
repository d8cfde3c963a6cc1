//! Game Gear session: processor, chipset and host capabilities

use crate::bus::{Chipset, GgBus};
use crate::config::GgConfig;
use crate::error::GgError;
use crate::host::Host;
use crate::rom::{Rom, RomHeader};
use crate::snapshot::{read_snapshot, write_snapshot};
use emu_core::cpu_z80::{CpuZ80, Processor};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::{MountPointInfo, System};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const CARTRIDGE: &str = "cartridge";

/// Cooperative stop request for [`GgSystem::run`]
///
/// Cloneable and `Send`, so it can be triggered from another thread; the
/// loop observes it at its next signal check.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Consume a pending request
    fn take(&self) -> bool {
        self.0.swap(false, Ordering::Relaxed)
    }
}

/// Game Gear emulator session
pub struct GgSystem<P: Processor = CpuZ80> {
    cpu: P,
    chips: Option<Chipset>,
    host: Host,
    config: GgConfig,
    stop: StopHandle,
    /// Cycles run since the last signal check
    cycles_since_check: u32,
}

impl GgSystem<CpuZ80> {
    /// Session with the reference processor and default configuration
    pub fn with_host(host: Host) -> Self {
        Self {
            cpu: CpuZ80::new(),
            chips: None,
            host,
            config: GgConfig::default(),
            stop: StopHandle::default(),
            cycles_since_check: 0,
        }
    }
}

impl<P: Processor> GgSystem<P> {
    pub fn new(cpu: P, host: Host, config: GgConfig) -> Result<Self, GgError> {
        config.validate()?;
        Ok(Self {
            cpu,
            chips: None,
            host,
            config,
            stop: StopHandle::default(),
            cycles_since_check: 0,
        })
    }

    /// Install a cartridge and power the machine on
    pub fn load_rom(&mut self, image: &[u8]) -> Result<(), GgError> {
        let rom = Rom::new(image)?;
        log(LogCategory::Mapper, LogLevel::Info, || {
            format!("cartridge with {} banks", rom.bank_count())
        });
        self.chips = Some(Chipset::new(rom, &self.config));
        self.cpu.reset();
        self.cycles_since_check = 0;
        Ok(())
    }

    pub fn rom_header(&self) -> Option<RomHeader> {
        self.chips.as_ref().and_then(|c| c.mapper.rom().header())
    }

    pub fn config(&self) -> &GgConfig {
        &self.config
    }

    pub fn cpu(&self) -> &P {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut P {
        &mut self.cpu
    }

    /// Chips of the loaded cartridge, for inspection
    pub fn chipset(&self) -> Option<&Chipset> {
        self.chips.as_ref()
    }

    pub fn host_mut(&mut self) -> &mut Host {
        &mut self.host
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    fn chips_mut(&mut self) -> Result<&mut Chipset, GgError> {
        self.chips.as_mut().ok_or(GgError::NoRom)
    }

    /// Execute one step and feed its cycles to the VDP and PSG
    fn step_inner(&mut self) -> Result<u32, GgError> {
        let chips = self.chips.as_mut().ok_or(GgError::NoRom)?;
        let cycles = self.cpu.step(&mut GgBus::new(chips, &mut self.host));
        chips.clock(cycles, &mut self.host);
        Ok(cycles)
    }

    /// Free-run until the host signal source or the stop handle asks to
    /// stop. Both are polled every `signal_check_cycles`; a later call
    /// continues exactly where this one returned.
    pub fn run(&mut self) -> Result<(), GgError> {
        self.chips_mut()?;
        loop {
            let cycles = self.step_inner()?;
            self.cycles_since_check += cycles;
            if self.cycles_since_check >= self.config.signal_check_cycles {
                self.cycles_since_check -= self.config.signal_check_cycles;
                let stop = self.host.check_signals();
                if self.stop.take() || stop {
                    return Ok(());
                }
            }
        }
    }

    /// Single step with the trace sink attached: report the decoded step,
    /// then execute it with RAM access tracing enabled
    pub fn trace(&mut self) -> Result<u32, GgError> {
        let chips = self.chips.as_mut().ok_or(GgError::NoRom)?;
        let mut bus = GgBus::new(chips, &mut self.host);
        if bus.host.has_trace() {
            let next = self.cpu.peek_step(&mut bus);
            bus.host.trace_cpu_step(&next);
        }
        bus.chips.mapper.set_trace(true);
        let cycles = self.cpu.step(&mut bus);
        bus.chips.mapper.set_trace(false);
        chips.clock(cycles, &mut self.host);
        Ok(cycles)
    }
}

impl<P: Processor> System for GgSystem<P> {
    type Error = GgError;

    fn reset(&mut self) {
        self.cpu.reset();
        if let Some(chips) = self.chips.as_mut() {
            chips.reset();
        }
        self.cycles_since_check = 0;
    }

    fn step(&mut self) -> Result<u32, Self::Error> {
        self.step_inner()
    }

    fn save_state(&mut self, out: &mut dyn Write) -> Result<(), Self::Error> {
        let chips = self.chips.as_ref().ok_or(GgError::NoRom)?;
        write_snapshot(out, &self.cpu, chips)?;
        log(LogCategory::State, LogLevel::Info, || "snapshot saved".to_string());
        Ok(())
    }

    /// Restore a snapshot. A rejected snapshot resets the whole machine to
    /// power-on state and warns the host before the error is returned.
    fn load_state(&mut self, input: &mut dyn Read) -> Result<(), Self::Error> {
        let chips = self.chips.as_mut().ok_or(GgError::NoRom)?;
        match read_snapshot::<P, _>(input, chips) {
            Ok(staged) => {
                staged.apply(&mut self.cpu, chips);
                log(LogCategory::State, LogLevel::Info, || "snapshot loaded".to_string());
                Ok(())
            }
            Err(e) => {
                self.cpu.reset();
                chips.reset();
                self.cycles_since_check = 0;
                self.host.warn(
                    LogCategory::State,
                    &format!("snapshot rejected, machine reset: {}", e),
                );
                Err(e.into())
            }
        }
    }

    fn supports_save_states(&self) -> bool {
        true
    }

    fn mount_points(&self) -> Vec<MountPointInfo> {
        vec![MountPointInfo {
            id: CARTRIDGE.to_string(),
            name: "Cartridge Slot".to_string(),
            extensions: vec!["gg".to_string(), "sms".to_string()],
            required: true,
        }]
    }

    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error> {
        if mount_point_id == CARTRIDGE {
            self.load_rom(data)
        } else {
            Err(GgError::InvalidMountPoint)
        }
    }

    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error> {
        if mount_point_id == CARTRIDGE {
            self.chips = None;
            Ok(())
        } else {
            Err(GgError::InvalidMountPoint)
        }
    }

    fn is_mounted(&self, mount_point_id: &str) -> bool {
        mount_point_id == CARTRIDGE && self.chips.is_some()
    }
}
