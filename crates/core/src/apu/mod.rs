//! Core APU (Audio Processing Unit) components.
//!
//! ## Audio Chips
//!
//! - **SN76489**: Sega's variant of the TI programmable sound generator, as
//!   found in the Master System and Game Gear (with the Game Gear's stereo
//!   channel masks)
//!
//! Chips produce fixed-size blocks of samples and hand them to an
//! [`AudioSink`] supplied by the caller on every clock feed.

pub mod sn76489;

pub use sn76489::Sn76489Psg;

/// Consumer of stereo sample blocks
///
/// Called synchronously from the emulation thread; implementations must
/// buffer rather than block until playback catches up.
pub trait AudioSink {
    /// Receive one block of samples in [0.0, 1.0]
    fn play(&mut self, left: &[f64], right: &[f64]);
}

impl<F: FnMut(&[f64], &[f64])> AudioSink for F {
    fn play(&mut self, left: &[f64], right: &[f64]) {
        self(left, right)
    }
}

/// Sink that discards every block
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudioSink;

impl AudioSink for NullAudioSink {
    fn play(&mut self, _left: &[f64], _right: &[f64]) {}
}
