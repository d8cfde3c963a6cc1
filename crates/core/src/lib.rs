//! Core emulator primitives and traits.
//!
//! Shared by the system crates: the [`System`] trait tying a machine
//! together, the Z80 processor interface, the SN76489-family sound
//! generator and the category logging facility.

pub mod apu;
pub mod cpu_z80;
pub mod logging;

use std::io::{Read, Write};

/// Description of a mount point (media slot) that a system supports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPointInfo {
    /// Unique identifier for this mount point (e.g., "Cartridge")
    pub id: String,
    /// User-friendly name for display (e.g., "Cartridge Slot")
    pub name: String,
    /// File extensions accepted by this mount point (e.g., ["gg"])
    pub extensions: Vec<String>,
    /// Whether this mount point is required for the system to function
    pub required: bool,
}

/// A high-level System trait tying components together.
pub trait System {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reset to initial power-on state
    fn reset(&mut self);

    /// Execute one processor step (instruction or interrupt acceptance) and
    /// advance every clocked component by the cycles it took.
    fn step(&mut self) -> Result<u32, Self::Error>;

    /// Write a complete machine snapshot.
    /// Note: snapshots never include ROM/cartridge data.
    fn save_state(&mut self, out: &mut dyn Write) -> Result<(), Self::Error>;

    /// Load a machine snapshot written by [`System::save_state`].
    fn load_state(&mut self, input: &mut dyn Read) -> Result<(), Self::Error>;

    /// Check if this system supports save/load state functionality
    fn supports_save_states(&self) -> bool {
        false
    }

    /// Get the list of mount points this system supports
    fn mount_points(&self) -> Vec<MountPointInfo>;

    /// Load media into a specific mount point
    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error>;

    /// Unload media from a specific mount point
    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error>;

    /// Check if a mount point has media loaded
    fn is_mounted(&self, mount_point_id: &str) -> bool;
}
