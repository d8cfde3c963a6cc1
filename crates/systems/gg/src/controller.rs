//! Game Gear built-in pad and START button

use crate::host::Host;
use serde::{Deserialize, Serialize};

/// Pressed-button bitmask as reported by an input source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buttons(pub u16);

impl Buttons {
    pub const NONE: Buttons = Buttons(0);
    pub const UP: Buttons = Buttons(0x01);
    pub const DOWN: Buttons = Buttons(0x02);
    pub const LEFT: Buttons = Buttons(0x04);
    pub const RIGHT: Buttons = Buttons(0x08);
    pub const TL: Buttons = Buttons(0x10);
    pub const TR: Buttons = Buttons(0x20);
    pub const START: Buttons = Buttons(0x100);

    pub fn contains(self, other: Buttons) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Buttons {
    type Output = Buttons;

    fn bitor(self, rhs: Buttons) -> Buttons {
        Buttons(self.0 | rhs.0)
    }
}

/// Digital input latch
///
/// The pad is sampled from the host on every port read; nothing is kept
/// between reads, so the controller carries no snapshot state.
#[derive(Debug, Default, Clone)]
pub struct Controller;

impl Controller {
    pub fn new() -> Self {
        Self
    }

    /// Port 0xDC/0xC0: direction and trigger lines, active low
    pub fn pad_port(&self, host: &mut Host) -> u8 {
        !((host.buttons().0 & 0x3F) as u8)
    }

    /// Bit 7 of port 0x00: START, active low
    pub fn start_bit(&self, host: &mut Host) -> u8 {
        if host.buttons().contains(Buttons::START) {
            0x00
        } else {
            0x80
        }
    }

    /// Port 0xDD/0xC1: the extension connector is not emulated
    pub fn ext_port(&self) -> u8 {
        0xFF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_pad_reads_all_high() {
        let mut host = Host::new();
        let pad = Controller::new();
        assert_eq!(pad.pad_port(&mut host), 0xFF);
        assert_eq!(pad.start_bit(&mut host), 0x80);
        assert_eq!(pad.ext_port(), 0xFF);
    }

    #[test]
    fn test_pressed_buttons_pull_lines_low() {
        let mut host = Host::new().with_input(|| Buttons::UP | Buttons::TR | Buttons::START);
        let pad = Controller::new();
        assert_eq!(pad.pad_port(&mut host), !0x21);
        assert_eq!(pad.start_bit(&mut host), 0x00);
    }
}
