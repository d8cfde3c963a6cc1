//! Sega Game Gear chipset emulator
//!
//! # Architecture
//!
//! - **CPU**: Zilog Z80 @ 3.58 MHz, supplied through [`emu_core::cpu_z80::Processor`]
//! - **Mapper**: Sega paging chip, three 16 KiB ROM slots plus 32 KiB cartridge RAM
//! - **VDP**: Sega 315-5378, 160x144 visible window of the 256x192 mode 4 screen,
//!   12-bit colour
//! - **PSG**: SN76489 with the Game Gear stereo masks
//! - **RAM**: 8 KiB work RAM
//!
//! The host wires a [`GgSystem`] to its display, audio, input and debugger
//! through a [`Host`]; every capability is optional.

mod bus;
mod config;
mod controller;
mod error;
mod host;
mod mapper;
mod rom;
mod snapshot;
mod system;
mod vdp;

pub use bus::{Chipset, GgBus};
pub use config::GgConfig;
pub use controller::{Buttons, Controller};
pub use error::{GgError, SnapshotError};
pub use host::{
    DiagnosticSink, DisplaySink, ExternalRamProvider, Host, InputSource, MemAccess, SignalSource,
    TraceSink,
};
pub use mapper::{BankInfo, MapperState, MemoryMapper, EXTERNAL_RAM_SIZE, RAM_SIZE};
pub use rom::{Region, Rom, RomHeader, BANK_SIZE};
pub use snapshot::MAGIC as SNAPSHOT_MAGIC;
pub use system::{GgSystem, StopHandle};
pub use vdp::{
    Vdp, VdpRegisters, VdpTiming, VramState, FRAME_PIXELS, HARDWARE_SPRITE_LIMIT, MAX_SPRITES,
    SCREEN_HEIGHT, SCREEN_WIDTH, SPRITE_LIMIT_RANGE,
};
