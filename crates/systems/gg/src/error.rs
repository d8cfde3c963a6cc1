//! Error types for the Game Gear system

use thiserror::Error;

/// Game Gear system errors
#[derive(Debug, Error)]
pub enum GgError {
    #[error("Invalid ROM size: {0} bytes (must be a non-zero multiple of 16384)")]
    InvalidRomSize(usize),

    #[error("Out of memory while allocating ROM storage")]
    OutOfMemory,

    #[error("No ROM loaded")]
    NoRom,

    #[error("Invalid mount point")]
    InvalidMountPoint,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Failures while writing or reading a machine snapshot
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bad snapshot header")]
    BadMagic,

    #[error("Failed to encode state: {0}")]
    Encode(String),

    #[error("Failed to decode state: {0}")]
    Decode(String),

    #[error("Invalid {component} state: {reason}")]
    Invalid {
        component: &'static str,
        reason: String,
    },
}
