//! Texas Instruments SN76489 Programmable Sound Generator
//!
//! The SN76489 is a sound chip used in the Sega Master System, Game Gear,
//! and many other systems. This is the Game Gear flavour, with per-side
//! channel masks.
//!
//! # Architecture
//! - 3 square wave tone channels
//! - 1 noise channel
//! - 4-bit attenuation per channel (0 = loudest, 0xF = silent)
//! - 10-bit frequency control for tone channels
//!
//! # Sega Variant (SN76496)
//! The Sega variant uses a 16-bit LFSR for noise (instead of 15-bit)
//!
//! # Timing
//! Channels are rendered lazily: CPU cycles accumulate until the sample
//! buffer would fill or a register write arrives, then the elapsed span is
//! rendered under the register values that were in effect during it. One
//! internal sample is 16 CPU cycles, and every [`BUFFER_SIZE`] samples the
//! four channels are mixed into a stereo block.

use super::AudioSink;
use crate::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

/// Samples per delivered block
pub const BUFFER_SIZE: usize = 2238;

/// CPU cycles per internal sample
pub const CYCLES_PER_SAMPLE: i32 = 16;

/// CPU clock the sample rate is derived from
pub const CPU_CLOCK_HZ: u32 = 3_579_545;

/// Internal sample rate, `CPU_CLOCK_HZ / 16`
pub const SAMPLES_PER_SEC: f64 = 223_721.5625;

/// Amplitude for each attenuation code
const VOLUME_TABLE: [f64; 16] = [
    0.25,
    0.198582058681,
    0.15773933612,
    0.125296808407,
    0.0995267926384,
    0.0790569415042,
    0.0627971607877,
    0.0498815578742,
    0.0396223298115,
    0.0314731352949,
    0.025,
    0.0198582058681,
    0.015773933612,
    0.0125296808407,
    0.00995267926384,
    0.0,
];

/// Attenuation code for silence
const SILENT: u8 = 0xF;

/// Field selected by the last latch byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatchType {
    Volume,
    Data,
}

/// Square wave channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneChannel {
    /// Reload value, 10 bits
    pub reg: u16,
    /// Countdown, 10 bits
    pub counter: u16,
    pub out: bool,
    /// Attenuation, 4 bits
    pub vol: u8,
}

impl ToneChannel {
    fn new() -> Self {
        Self {
            reg: 0,
            counter: 0,
            out: false,
            vol: SILENT,
        }
    }

    /// Attenuation code currently on the output
    fn level(&self) -> u8 {
        // Reload values of 0 and 1 hold the output high
        if self.reg <= 1 || self.out {
            self.vol
        } else {
            SILENT
        }
    }

    fn render(&mut self, buffer: &mut [u8]) {
        let mut vol = self.level();
        for sample in buffer.iter_mut() {
            if expire(&mut self.counter) {
                if self.reg > 1 {
                    self.out = !self.out;
                }
                vol = self.level();
                self.counter = self.reg;
            }
            *sample = vol;
        }
    }
}

/// Noise channel with its shift register
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseChannel {
    /// Reload select: 0x10, 0x20, 0x40 or the tone 2 reload
    pub sel_len: u8,
    /// White noise when set, periodic otherwise
    pub white: bool,
    pub counter: u16,
    pub shift: u16,
    pub vol: u8,
    pub out: bool,
    /// Last value loaded into the counter; tone 2 reloads keep only the low byte
    pub reg: u16,
}

impl NoiseChannel {
    fn new() -> Self {
        Self {
            sel_len: 0,
            white: false,
            counter: 0x10,
            shift: 0x80,
            vol: SILENT,
            out: false,
            reg: 0x10,
        }
    }

    fn level(&self) -> u8 {
        if self.shift & 0x80 != 0 {
            self.vol
        } else {
            SILENT
        }
    }

    /// Apply a control nibble: bits 1..0 length, bit 2 white
    fn set_control(&mut self, data: u8) {
        self.sel_len = data & 0x3;
        self.white = data & 0x4 != 0;
        if !self.white {
            self.shift = 0x80;
        }
    }

    fn render(&mut self, tone2_reg: u16, buffer: &mut [u8]) {
        let mut vol = self.level();
        for sample in buffer.iter_mut() {
            if expire(&mut self.counter) {
                let clk = if self.reg <= 1 {
                    !self.out
                } else {
                    self.out = !self.out;
                    self.out
                };
                if clk {
                    let feedback = if self.white {
                        ((self.shift >> 15) ^ (self.shift >> 12)) & 0x1
                    } else {
                        self.shift >> 15
                    };
                    self.shift = (self.shift << 1) | feedback;
                    vol = self.level();
                }
                self.reg = match self.sel_len {
                    0 => 0x10,
                    1 => 0x20,
                    2 => 0x40,
                    _ => tone2_reg & 0xFF,
                };
                self.counter = self.reg;
            }
            *sample = vol;
        }
    }
}

/// Count down once; true when the counter expires
fn expire(counter: &mut u16) -> bool {
    if *counter == 0 {
        return true;
    }
    *counter -= 1;
    *counter == 0
}

/// Sample position and cycle bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsgTiming {
    /// Next sample to render
    pub pos: u32,
    /// CPU cycles not yet rendered
    pub cc: i32,
    /// CPU cycles until the buffer is full
    pub cc_to_frame: i32,
}

/// SN76489 PSG state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sn76489Psg {
    latch_channel: u8,
    latch_type: LatchType,
    tones: [ToneChannel; 3],
    noise: NoiseChannel,
    /// Raw attenuation codes per channel, one byte per sample
    buffers: [Vec<u8>; 4],
    timing: PsgTiming,
    left_mask: u8,
    right_mask: u8,
}

impl Default for Sn76489Psg {
    fn default() -> Self {
        Self::new()
    }
}

impl Sn76489Psg {
    /// Create a new SN76489 PSG in its power-on state
    pub fn new() -> Self {
        Self {
            latch_channel: 0,
            latch_type: LatchType::Data,
            tones: [ToneChannel::new(), ToneChannel::new(), ToneChannel::new()],
            noise: NoiseChannel::new(),
            buffers: std::array::from_fn(|_| vec![SILENT; BUFFER_SIZE]),
            timing: PsgTiming {
                pos: 0,
                cc: 0,
                cc_to_frame: BUFFER_SIZE as i32 * CYCLES_PER_SAMPLE,
            },
            left_mask: 0xF,
            right_mask: 0xF,
        }
    }

    /// Reset the PSG to its power-on state
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Feed elapsed CPU cycles
    pub fn clock(&mut self, cycles: u32, sink: &mut dyn AudioSink) {
        self.timing.cc += cycles as i32;
        if self.timing.cc >= self.timing.cc_to_frame {
            self.catch_up(sink);
        }
    }

    /// Write to the sound port
    ///
    /// A byte with bit 7 set latches a channel (bits 6..5) and a field
    /// (bit 4: volume when set) and carries the low data bits; a byte with
    /// bit 7 clear supplies the high bits for the latched field.
    pub fn write(&mut self, data: u8, sink: &mut dyn AudioSink) {
        self.catch_up(sink);
        log(LogCategory::PSG, LogLevel::Trace, || {
            format!("PSG <- {:02X}", data)
        });

        if data & 0x80 != 0 {
            self.latch_channel = (data >> 5) & 0x3;
            self.latch_type = if data & 0x10 != 0 {
                LatchType::Volume
            } else {
                LatchType::Data
            };
            let ch = self.latch_channel as usize;
            match (self.latch_type, ch) {
                (LatchType::Data, 3) => self.noise.set_control(data),
                (LatchType::Data, _) => {
                    self.tones[ch].reg = (self.tones[ch].reg & 0xFFF0) | (data & 0xF) as u16;
                }
                (LatchType::Volume, 3) => self.noise.vol = data & 0xF,
                (LatchType::Volume, _) => self.tones[ch].vol = data & 0xF,
            }
        } else if self.latch_type == LatchType::Data {
            let ch = self.latch_channel as usize;
            if ch == 3 {
                self.noise.set_control(data);
            } else {
                self.tones[ch].reg = (self.tones[ch].reg & 0x000F) | (((data & 0x3F) as u16) << 4);
            }
        }
        // A data byte following a volume latch is ignored
    }

    /// Game Gear stereo register: high nibble left mask, low nibble right mask
    pub fn write_stereo(&mut self, data: u8, sink: &mut dyn AudioSink) {
        self.catch_up(sink);
        self.right_mask = data & 0xF;
        self.left_mask = data >> 4;
    }

    pub fn tone(&self, channel: usize) -> &ToneChannel {
        &self.tones[channel]
    }

    pub fn noise(&self) -> &NoiseChannel {
        &self.noise
    }

    pub fn timing(&self) -> &PsgTiming {
        &self.timing
    }

    /// (left, right) channel masks
    pub fn masks(&self) -> (u8, u8) {
        (self.left_mask, self.right_mask)
    }

    /// Structural checks for a deserialized state
    pub fn validate(&self) -> Result<(), String> {
        if self.latch_channel > 3 {
            return Err(format!("latch channel {} out of range", self.latch_channel));
        }
        for (i, tone) in self.tones.iter().enumerate() {
            if tone.vol > 0xF || tone.reg > 0x3FF || tone.counter > 0x3FF {
                return Err(format!("tone channel {} out of range", i));
            }
        }
        let noise = &self.noise;
        if noise.vol > 0xF || noise.sel_len > 3 || noise.counter > 0xFF || noise.reg > 0xFF {
            return Err("noise channel out of range".to_string());
        }
        for (i, buffer) in self.buffers.iter().enumerate() {
            if buffer.len() != BUFFER_SIZE {
                return Err(format!("channel buffer {} has length {}", i, buffer.len()));
            }
            if buffer.iter().any(|&b| b > 0xF) {
                return Err(format!("channel buffer {} holds a non-nibble value", i));
            }
        }
        if self.timing.pos as usize >= BUFFER_SIZE {
            return Err(format!("buffer position {} out of range", self.timing.pos));
        }
        if self.timing.cc < 0 || self.timing.cc_to_frame <= 0 {
            return Err("negative cycle counters".to_string());
        }
        if self.left_mask > 0xF || self.right_mask > 0xF {
            return Err("stereo masks out of range".to_string());
        }
        Ok(())
    }

    /// Render every whole sample covered by the accumulated cycles
    fn catch_up(&mut self, sink: &mut dyn AudioSink) {
        self.timing.cc_to_frame -= self.timing.cc;
        let mut npos = self.timing.pos as usize + (self.timing.cc / CYCLES_PER_SAMPLE) as usize;
        self.timing.cc %= CYCLES_PER_SAMPLE;
        self.timing.cc_to_frame += self.timing.cc;

        while npos >= BUFFER_SIZE {
            self.run(self.timing.pos as usize, BUFFER_SIZE, sink);
            npos -= BUFFER_SIZE;
            self.timing.pos = 0;
        }
        self.run(self.timing.pos as usize, npos, sink);
        self.timing.pos = npos as u32;

        if self.timing.cc_to_frame <= 0 {
            self.timing.cc_to_frame = (BUFFER_SIZE as i32 - self.timing.pos as i32) * CYCLES_PER_SAMPLE;
        }
    }

    fn run(&mut self, begin: usize, end: usize, sink: &mut dyn AudioSink) {
        let tone2_reg = self.tones[2].reg;
        for (tone, buffer) in self.tones.iter_mut().zip(self.buffers.iter_mut()) {
            tone.render(&mut buffer[begin..end]);
        }
        self.noise.render(tone2_reg, &mut self.buffers[3][begin..end]);

        if end == BUFFER_SIZE {
            let left = self.mix(self.left_mask);
            let right = self.mix(self.right_mask);
            sink.play(&left, &right);
        }
    }

    /// Sum the amplitudes of the channels selected by `mask`
    fn mix(&self, mask: u8) -> Vec<f64> {
        let mut out = vec![0.0; BUFFER_SIZE];
        for (j, buffer) in self.buffers.iter().enumerate() {
            if mask & (1 << j) == 0 {
                continue;
            }
            for (o, &code) in out.iter_mut().zip(buffer.iter()) {
                *o += VOLUME_TABLE[code as usize];
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apu::NullAudioSink;

    /// Collects delivered blocks
    #[derive(Default)]
    struct Blocks(Vec<(Vec<f64>, Vec<f64>)>);

    impl AudioSink for Blocks {
        fn play(&mut self, left: &[f64], right: &[f64]) {
            self.0.push((left.to_vec(), right.to_vec()));
        }
    }

    const FULL_BUFFER: u32 = BUFFER_SIZE as u32 * CYCLES_PER_SAMPLE as u32;

    #[test]
    fn test_psg_creation() {
        let psg = Sn76489Psg::new();
        for ch in 0..3 {
            assert_eq!(psg.tone(ch).vol, 0x0F);
            assert_eq!(psg.tone(ch).reg, 0);
        }
        assert_eq!(psg.noise().shift, 0x80);
        assert_eq!(psg.noise().reg, 0x10);
        assert_eq!(psg.masks(), (0xF, 0xF));
        assert_eq!(psg.timing().cc_to_frame, 2238 * 16);
    }

    #[test]
    fn test_psg_volume_write() {
        let mut psg = Sn76489Psg::new();
        let sink = &mut NullAudioSink;

        psg.write(0x90, sink); // Channel 0, volume 0 (max)
        assert_eq!(psg.tone(0).vol, 0x00);
        psg.write(0xB5, sink); // Channel 1, volume 5
        assert_eq!(psg.tone(1).vol, 0x05);
        psg.write(0xF3, sink); // Noise, volume 3
        assert_eq!(psg.noise().vol, 0x03);
    }

    #[test]
    fn test_data_byte_after_volume_latch_is_ignored() {
        let mut psg = Sn76489Psg::new();
        let sink = &mut NullAudioSink;

        psg.write(0x9F, sink);
        psg.write(0x05, sink);
        assert_eq!(psg.tone(0).vol, 0x0F);
        assert_eq!(psg.tone(0).reg, 0);
    }

    #[test]
    fn test_psg_tone_frequency() {
        let mut psg = Sn76489Psg::new();
        let sink = &mut NullAudioSink;

        psg.write(0x84, sink); // Latch tone 0, data, low 4 bits = 0x4
        psg.write(0x1A, sink); // High 6 bits = 0x1A
        assert_eq!(psg.tone(0).reg, 0x1A4);

        // A new low nibble keeps the high bits
        psg.write(0x8F, sink);
        assert_eq!(psg.tone(0).reg, 0x1AF);
    }

    #[test]
    fn test_psg_noise_control() {
        let mut psg = Sn76489Psg::new();
        let sink = &mut NullAudioSink;

        psg.write(0xE7, sink); // white noise, tone 2 rate
        assert!(psg.noise().white);
        assert_eq!(psg.noise().sel_len, 3);

        // Periodic mode reseeds the shift register
        psg.noise.shift = 0x1234;
        psg.write(0xE1, sink);
        assert!(!psg.noise().white);
        assert_eq!(psg.noise().shift, 0x80);
    }

    #[test]
    fn test_noise_tone2_rate_keeps_low_byte() {
        let mut psg = Sn76489Psg::new();
        let sink = &mut NullAudioSink;
        psg.write(0xC3, sink); // tone 2 low nibble 3
        psg.write(0x12, sink); // tone 2 reload 0x123
        psg.write(0xE3, sink); // periodic noise at the tone 2 rate
        assert_eq!(psg.tone(2).reg, 0x123);

        psg.clock(1024, sink);
        psg.write_stereo(0xFF, sink);
        assert_eq!(psg.noise().reg, 0x23);
        assert!(psg.noise().counter <= 0x23);
    }

    #[test]
    fn test_tone_square_wave() {
        let mut psg = Sn76489Psg::new();
        let sink = &mut NullAudioSink;
        psg.write(0x84, sink); // reload 4
        psg.write(0x90, sink); // volume 0

        psg.clock(8 * 16, sink);
        psg.write(0x90, sink); // forces the elapsed samples to render
        assert_eq!(psg.timing().pos, 8);
        assert_eq!(&psg.buffers[0][..8], &[0, 0, 0, 0, 0xF, 0xF, 0xF, 0xF]);
    }

    #[test]
    fn test_low_reload_holds_output() {
        let mut psg = Sn76489Psg::new();
        let sink = &mut NullAudioSink;
        psg.write(0x81, sink); // reload 1
        psg.write(0x92, sink); // volume 2

        psg.clock(32 * 16, sink);
        psg.write_stereo(0xFF, sink);
        assert!(psg.buffers[0][..32].iter().all(|&v| v == 2));
    }

    #[test]
    fn test_periodic_noise_rotates_on_rising_edge() {
        let mut psg = Sn76489Psg::new();
        let sink = &mut NullAudioSink;

        // Counter starts at 0x10, so the first expiry is the 16th sample
        psg.clock(15 * 16, sink);
        psg.write_stereo(0xFF, sink);
        assert_eq!(psg.noise().shift, 0x80);
        psg.clock(16, sink);
        psg.write_stereo(0xFF, sink);
        assert_eq!(psg.noise().shift, 0x100);
        assert!(psg.noise().out);
    }

    #[test]
    fn test_cycles_accumulate_below_one_sample() {
        let mut psg = Sn76489Psg::new();
        let sink = &mut NullAudioSink;

        psg.clock(15, sink);
        psg.write_stereo(0xFF, sink);
        assert_eq!(psg.timing().pos, 0);
        assert_eq!(psg.timing().cc, 15);

        psg.clock(1, sink);
        psg.write_stereo(0xFF, sink);
        assert_eq!(psg.timing().pos, 1);
        assert_eq!(psg.timing().cc, 0);
    }

    #[test]
    fn test_full_buffer_delivers_one_block() {
        let mut psg = Sn76489Psg::new();
        let mut blocks = Blocks::default();

        psg.clock(FULL_BUFFER - 1, &mut blocks);
        assert!(blocks.0.is_empty());
        psg.clock(1, &mut blocks);
        assert_eq!(blocks.0.len(), 1);
        assert_eq!(blocks.0[0].0.len(), BUFFER_SIZE);
        assert_eq!(psg.timing().pos, 0);

        // Silent channels produce silence
        assert!(blocks.0[0].0.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_large_feed_delivers_every_block() {
        let mut psg = Sn76489Psg::new();
        let mut blocks = Blocks::default();
        psg.clock(FULL_BUFFER * 3 + 5 * 16, &mut blocks);
        assert_eq!(blocks.0.len(), 3);
        assert_eq!(psg.timing().pos, 5);
    }

    #[test]
    fn test_zero_mask_side_is_silent() {
        let mut psg = Sn76489Psg::new();
        let mut blocks = Blocks::default();
        psg.write(0x90, &mut blocks); // tone 0 loud, reload 0 holds it high
        psg.write(0xF0, &mut blocks); // noise loud
        psg.write_stereo(0xF0, &mut blocks); // left all, right none

        psg.clock(FULL_BUFFER, &mut blocks);
        let (left, right) = &blocks.0[0];
        assert!(right.iter().all(|&s| s == 0.0));
        assert!(left.iter().all(|&s| s >= 0.25 && s <= 1.0));
    }

    #[test]
    fn test_validate_and_serde_roundtrip() {
        let mut psg = Sn76489Psg::new();
        let sink = &mut NullAudioSink;
        psg.write(0x84, sink);
        psg.clock(1000, sink);

        let json = serde_json::to_string(&psg).unwrap();
        let restored: Sn76489Psg = serde_json::from_str(&json).unwrap();
        assert!(restored.validate().is_ok());
        assert_eq!(restored, psg);

        let mut bad = psg.clone();
        bad.tones[1].vol = 0x10;
        assert!(bad.validate().is_err());

        let mut bad = psg.clone();
        bad.timing.pos = BUFFER_SIZE as u32;
        assert!(bad.validate().is_err());

        let mut bad = psg.clone();
        bad.noise.reg = 0x123;
        assert!(bad.validate().is_err());

        let mut bad = psg;
        bad.buffers[2][7] = 0x1F;
        assert!(bad.validate().is_err());
    }
}
