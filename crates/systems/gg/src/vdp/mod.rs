//! Game Gear VDP (Sega 315-5378, mode 4 only)
//!
//! The VDP is driven lazily. [`Vdp::clock`] only accumulates elapsed CPU
//! cycles and catches up when an interrupt might have been reached; every
//! port access that can observe or change the timing state catches up first.
//!
//! Timing is tracked in "counts" (171 per line, 262 lines per frame). The
//! internal accumulator holds thirds of a CPU cycle, four of which make one
//! count. Lines are grouped by V:
//!
//! - 0-23: active display, nothing visible yet (sprite evaluation only)
//! - 24-167: the 144 lines shown on the LCD, each rendered at H = 111
//! - 168-191: rest of the active display; frame interrupt at (191, 159)
//! - 192-260: blanking; the line counter is reloaded at H = 159
//! - 261: first line counter decrement of the next frame
//!
//! Reaching line 262 wraps to line 0 and applies the vertical scroll
//! latched during the previous frame.

mod render;

use crate::host::DisplaySink;
use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;
pub const FRAME_PIXELS: usize = SCREEN_WIDTH * SCREEN_HEIGHT;

/// Entries in the sprite attribute table
pub const MAX_SPRITES: usize = 64;
/// Sprites per line on real hardware
pub const HARDWARE_SPRITE_LIMIT: usize = 8;
/// Accepted per-line sprite buffer sizes
pub const SPRITE_LIMIT_RANGE: RangeInclusive<usize> = HARDWARE_SPRITE_LIMIT..=MAX_SPRITES;

fn clamp_sprite_limit(limit: usize) -> usize {
    limit.clamp(HARDWARE_SPRITE_LIMIT, MAX_SPRITES)
}

const VRAM_SIZE: usize = 0x4000;
const CRAM_SIZE: usize = 64;

const COUNTS_PER_LINE: i32 = 171;
const COUNTS_TO_RENDER_LINE: i32 = 111;
const COUNTS_TO_INT_LINE: i32 = 159;
const LINES_PER_FRAME: i32 = 262;
const FIRST_VISIBLE_LINE: i32 = 24;
const END_VISIBLE_LINE: i32 = 168;

const STATUS_FRAME: u8 = 0x80;
const STATUS_OVERFLOW: u8 = 0x40;
const STATUS_COLLISION: u8 = 0x20;

/// Decoded register file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VdpRegisters {
    // R0
    pub m2: bool,
    pub m4: bool,
    /// Shift every sprite 8 dots to the left
    pub ec: bool,
    /// Line interrupt enable
    pub ie1: bool,
    /// Lock vertical scroll for the two rightmost columns
    pub mvs: bool,

    // R1
    pub dsize: bool,
    pub size: bool,
    pub m3: bool,
    pub m1: bool,
    /// Frame interrupt enable
    pub ie: bool,
    /// Display disabled; only the backdrop is shown
    pub blank: bool,
    pub blank_latch: bool,

    pub nt_addr: u16,
    pub sat_addr: u16,
    pub spg_addr: u16,
    pub backdrop: u8,

    // R8, applied at the end of the current line
    pub col: u8,
    pub fx: u8,
    pub col_latch: u8,
    pub fx_latch: u8,

    // R9, applied at the start of a frame
    pub row: u8,
    pub fy: u8,
    pub row_temp: u8,
    pub fy_temp: u8,

    pub line_counter: u8,
}

impl VdpRegisters {
    fn power_on() -> Self {
        Self {
            line_counter: 1,
            ..Self::default()
        }
    }
}

/// Beam position and interrupt countdowns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VdpTiming {
    pub h: i32,
    pub v: i32,
    /// Pending thirds of a CPU cycle
    pub cc: i32,
    pub cc_to_line_int: i32,
    pub cc_to_frame_int: i32,
}

impl VdpTiming {
    fn power_on() -> Self {
        Self {
            h: 0,
            v: 0,
            cc: 0,
            cc_to_line_int: 4 * COUNTS_TO_INT_LINE,
            cc_to_frame_int: 4 * (191 * COUNTS_PER_LINE + COUNTS_TO_INT_LINE),
        }
    }
}

/// Frame under construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FrameRender {
    fb: Vec<u16>,
    /// Next line to render, 24..=168
    lines: i32,
    /// Next pixel to write
    cursor: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct SpriteEntry {
    index: u8,
    /// Byte offset of the pattern row inside the sprite's pattern
    row_offset: u16,
}

/// Sprites selected for the next line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct SpriteBuffer {
    size: bool,
    dsize: bool,
    entries: Vec<SpriteEntry>,
}

/// Per-line scratch, rewritten before every use
#[derive(Debug, Clone)]
struct LineScratch {
    bg: [u8; SCREEN_WIDTH],
    priority: [bool; SCREEN_WIDTH],
    sprites: [u8; 256],
}

impl Default for LineScratch {
    fn default() -> Self {
        Self {
            bg: [0; SCREEN_WIDTH],
            priority: [false; SCREEN_WIDTH],
            sprites: [0; 256],
        }
    }
}

/// Read-only view of video memory for debuggers
#[derive(Debug, Clone, Copy)]
pub struct VramState<'a> {
    pub vram: &'a [u8],
    pub nt_addr: u16,
    pub sat_addr: u16,
}

fn default_sprite_limit() -> usize {
    MAX_SPRITES
}

/// Video display processor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vdp {
    vram: Vec<u8>,
    cram: Vec<u8>,
    status: u8,
    control_flag: bool,
    addr: u16,
    aux_byte: u8,
    code: u8,
    buffer: u8,
    cram_latch: u8,
    h_latch: u8,
    line_int_pending: bool,
    regs: VdpRegisters,
    timing: VdpTiming,
    line_int_counter: i32,
    render: FrameRender,
    sprites: SpriteBuffer,
    #[serde(skip, default = "default_sprite_limit")]
    sprite_limit: usize,
    #[serde(skip)]
    scratch: LineScratch,
}

impl Default for Vdp {
    fn default() -> Self {
        Self::new(MAX_SPRITES)
    }
}

impl Vdp {
    /// Power-on VDP buffering at most `sprite_limit` sprites per line
    pub fn new(sprite_limit: usize) -> Self {
        let regs = VdpRegisters::power_on();
        let line_int_counter = regs.line_counter as i32;
        Self {
            vram: vec![0; VRAM_SIZE],
            cram: vec![0; CRAM_SIZE],
            status: 0,
            control_flag: false,
            addr: 0,
            aux_byte: 0,
            code: 0,
            buffer: 0,
            cram_latch: 0,
            h_latch: 0,
            line_int_pending: false,
            regs,
            timing: VdpTiming::power_on(),
            line_int_counter,
            render: FrameRender {
                fb: vec![0; FRAME_PIXELS],
                lines: FIRST_VISIBLE_LINE,
                cursor: 0,
            },
            sprites: SpriteBuffer::default(),
            sprite_limit: clamp_sprite_limit(sprite_limit),
            scratch: LineScratch::default(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.sprite_limit);
    }

    pub fn sprite_limit(&self) -> usize {
        self.sprite_limit
    }

    pub(crate) fn set_sprite_limit(&mut self, limit: usize) {
        self.sprite_limit = clamp_sprite_limit(limit);
    }

    /// Level of the interrupt line driven into the CPU
    pub fn irq_line(&self) -> bool {
        (self.regs.ie && self.status & STATUS_FRAME != 0)
            || (self.regs.ie1 && self.line_int_pending)
    }

    /// Feed elapsed CPU cycles
    pub fn clock(&mut self, cycles: u32, display: &mut dyn DisplaySink) {
        self.timing.cc += 3 * cycles as i32;
        if (!self.line_int_pending && self.timing.cc >= self.timing.cc_to_line_int)
            || self.timing.cc >= self.timing.cc_to_frame_int
        {
            self.catch_up(display);
        }
    }

    /// Control port write (0xBF)
    pub fn write_control(&mut self, byte: u8, display: &mut dyn DisplaySink) {
        if !self.control_flag {
            self.addr = byte as u16;
            self.aux_byte = byte;
            self.control_flag = true;
            return;
        }

        self.addr |= ((byte & 0x3F) as u16) << 8;
        self.code = byte >> 6;
        match self.code {
            0 => {
                self.buffer = self.vram[self.addr as usize];
                self.increment_addr();
            }
            2 => {
                self.catch_up(display);
                self.write_register(byte & 0x0F);
            }
            _ => {}
        }
        self.control_flag = false;
    }

    fn write_register(&mut self, reg: u8) {
        let data = self.aux_byte;
        log(LogCategory::VDP, LogLevel::Trace, || {
            format!("R{} <- {:02X}", reg, data)
        });

        let regs = &mut self.regs;
        let latch_now = self.timing.h >= COUNTS_TO_RENDER_LINE
            || self.timing.v > 191
            || self.timing.v < FIRST_VISIBLE_LINE;
        match reg {
            0 => {
                regs.mvs = data & 0x80 != 0;
                regs.ie1 = data & 0x10 != 0;
                regs.ec = data & 0x08 != 0;
                regs.m4 = data & 0x04 != 0;
                regs.m2 = data & 0x02 != 0;
            }
            1 => {
                regs.blank_latch = data & 0x40 == 0;
                if latch_now {
                    regs.blank = regs.blank_latch;
                }
                regs.ie = data & 0x20 != 0;
                regs.m1 = data & 0x10 != 0;
                regs.m3 = data & 0x08 != 0;
                regs.size = data & 0x02 != 0;
                regs.dsize = data & 0x01 != 0;
            }
            2 => regs.nt_addr = ((data & 0x0E) as u16) << 10,
            5 => regs.sat_addr = ((data & 0x7E) as u16) << 7,
            6 => regs.spg_addr = ((data & 0x04) as u16) << 11,
            7 => regs.backdrop = data & 0x0F,
            8 => {
                regs.col_latch = (data & 0xF8) >> 3;
                regs.fx_latch = data & 0x07;
                if latch_now {
                    regs.col = regs.col_latch;
                    regs.fx = regs.fx_latch;
                }
            }
            9 => {
                regs.row_temp = (data & 0xF8) >> 3;
                regs.fy_temp = data & 0x07;
            }
            10 => {
                regs.line_counter = data;
                self.update_cc_to_line_int();
            }
            _ => {}
        }
    }

    /// Data port write (0xBE)
    pub fn write_data(&mut self, byte: u8, display: &mut dyn DisplaySink) {
        self.catch_up(display);
        self.control_flag = false;
        self.buffer = byte;
        if self.code == 3 {
            if self.addr & 1 != 0 {
                let addr = (self.addr & 0x3F) as usize;
                self.cram[addr] = byte & 0x0F;
                self.cram[addr - 1] = self.cram_latch;
            } else {
                self.cram_latch = byte;
            }
        } else {
            self.vram[self.addr as usize] = byte;
        }
        self.increment_addr();
    }

    /// Data port read (0xBE), served from the read-ahead buffer
    pub fn read_data(&mut self) -> u8 {
        let ret = self.buffer;
        self.buffer = self.vram[self.addr as usize];
        self.increment_addr();
        self.control_flag = false;
        ret
    }

    /// Status port read (0xBF); clears every flag
    pub fn read_status(&mut self, display: &mut dyn DisplaySink) -> u8 {
        self.catch_up(display);
        let ret = self.status;
        self.status = 0;
        self.control_flag = false;
        self.line_int_pending = false;
        ret
    }

    /// V counter (even ports 0x40-0x7F)
    pub fn read_v(&mut self, display: &mut dyn DisplaySink) -> u8 {
        self.catch_up(display);
        let v = if self.timing.h >= COUNTS_TO_INT_LINE {
            self.timing.v + 1
        } else {
            self.timing.v
        };
        if self.timing.v <= 0xDA {
            v as u8
        } else {
            (v - 6) as u8
        }
    }

    /// Capture the H counter for later [`Vdp::h_counter`] reads
    pub fn latch_h_counter(&mut self, display: &mut dyn DisplaySink) {
        self.catch_up(display);
        self.h_latch = self.timing.h as u8;
    }

    /// Latched H counter (odd ports 0x40-0x7F)
    pub fn h_counter(&self) -> u8 {
        self.h_latch
    }

    pub fn cram(&self) -> &[u8] {
        &self.cram
    }

    pub fn vram_state(&self) -> VramState<'_> {
        VramState {
            vram: &self.vram,
            nt_addr: self.regs.nt_addr,
            sat_addr: self.regs.sat_addr,
        }
    }

    /// Status flags without the read side effects
    pub fn status_peek(&self) -> u8 {
        self.status
    }

    pub fn registers(&self) -> &VdpRegisters {
        &self.regs
    }

    pub fn timing(&self) -> &VdpTiming {
        &self.timing
    }

    pub fn line_interrupt_counter(&self) -> i32 {
        self.line_int_counter
    }

    pub fn line_interrupt_pending(&self) -> bool {
        self.line_int_pending
    }

    /// Frame buffer, possibly partially rendered
    pub fn frame(&self) -> &[u16] {
        &self.render.fb
    }

    /// Sprites buffered for the next line
    pub fn buffered_sprites(&self) -> usize {
        self.sprites.entries.len()
    }

    /// Structural checks on a decoded state
    pub fn validate(&self) -> Result<(), String> {
        if self.vram.len() != VRAM_SIZE || self.cram.len() != CRAM_SIZE {
            return Err("video memory size".to_string());
        }
        if self.addr & 0x3FFF != self.addr {
            return Err(format!("address {:04X}", self.addr));
        }
        if self.code > 3 {
            return Err(format!("access code {}", self.code));
        }

        let r = &self.regs;
        let masked = [
            ("name table", r.nt_addr, 0x3800),
            ("sprite table", r.sat_addr, 0x3F00),
            ("sprite patterns", r.spg_addr, 0x2000),
            ("backdrop", r.backdrop as u16, 0x0F),
            ("column", r.col as u16, 0x1F),
            ("column latch", r.col_latch as u16, 0x1F),
            ("fine X", r.fx as u16, 0x07),
            ("fine X latch", r.fx_latch as u16, 0x07),
            ("row", r.row as u16, 0x1F),
            ("row latch", r.row_temp as u16, 0x1F),
            ("fine Y", r.fy as u16, 0x07),
            ("fine Y latch", r.fy_temp as u16, 0x07),
        ];
        if let Some((name, value, _)) = masked.iter().find(|(_, v, m)| v & m != *v) {
            return Err(format!("{} register {:04X}", name, value));
        }

        let t = &self.timing;
        if !(0..COUNTS_PER_LINE).contains(&t.h)
            || !(0..LINES_PER_FRAME).contains(&t.v)
            || t.cc < 0
        {
            return Err(format!("beam position ({}, {}) cc {}", t.v, t.h, t.cc));
        }
        if self.line_int_counter < 0 {
            return Err(format!("line counter {}", self.line_int_counter));
        }

        let fr = &self.render;
        if fr.fb.len() != FRAME_PIXELS {
            return Err(format!("frame buffer of {} pixels", fr.fb.len()));
        }
        if !(FIRST_VISIBLE_LINE..=END_VISIBLE_LINE).contains(&fr.lines)
            || fr.cursor != (fr.lines - FIRST_VISIBLE_LINE) as usize * SCREEN_WIDTH
        {
            return Err(format!("render cursor {} at line {}", fr.cursor, fr.lines));
        }
        if fr.fb.iter().any(|&px| px > 0x0FFF) {
            return Err("pixel out of range".to_string());
        }

        if self.sprites.entries.len() > self.sprite_limit {
            return Err(format!(
                "{} buffered sprites, limit {}",
                self.sprites.entries.len(),
                self.sprite_limit
            ));
        }
        for entry in &self.sprites.entries {
            if entry.index as usize >= MAX_SPRITES {
                return Err(format!("sprite index {}", entry.index));
            }
            if entry.row_offset % 4 != 0 || entry.row_offset >= 64 {
                return Err(format!("sprite row offset {}", entry.row_offset));
            }
        }
        Ok(())
    }

    /// Install a state accepted by [`Vdp::validate`], keeping this VDP's
    /// sprite limit
    pub fn restore(&mut self, mut state: Vdp) {
        state.sprite_limit = self.sprite_limit;
        *self = state;
    }

    fn increment_addr(&mut self) {
        self.addr = (self.addr + 1) & 0x3FFF;
    }

    fn raise_line_interrupt(&mut self) {
        self.line_int_pending = true;
        log(LogCategory::Interrupts, LogLevel::Trace, || {
            format!("line interrupt at V={}", self.timing.v)
        });
    }

    fn raise_frame_interrupt(&mut self) {
        self.status |= STATUS_FRAME;
        log(LogCategory::Interrupts, LogLevel::Trace, || {
            "frame interrupt".to_string()
        });
    }

    fn deliver_frame(&mut self, display: &mut dyn DisplaySink) {
        log(LogCategory::VDP, LogLevel::Debug, || "frame complete".to_string());
        display.draw_frame(&self.render.fb);
    }

    /// Line counter events between two positions
    fn run_icounts(&mut self, vb: i32, hb: i32, ve: i32, he: i32) {
        let mut icounts = icounts(vb, hb, ve, he);
        if icounts > self.line_int_counter {
            self.raise_line_interrupt();
            icounts -= self.line_int_counter + 1;
            let reload = self.regs.line_counter as i32;
            self.line_int_counter = reload - icounts % (reload + 1);
        } else {
            self.line_int_counter -= icounts;
        }
    }

    fn run_first_icount(&mut self) {
        if self.line_int_counter == 0 {
            self.raise_line_interrupt();
            self.line_int_counter = self.regs.line_counter as i32;
        } else {
            self.line_int_counter -= 1;
        }
    }

    /// Like `run_icounts` up to the end of line 191, without touching the
    /// counter; it is reloaded during blanking anyway
    fn run_icounts_end(&mut self, vb: i32, hb: i32) {
        let icounts = 191 - vb + 1 - (hb >= COUNTS_TO_INT_LINE) as i32;
        if icounts > self.line_int_counter {
            self.raise_line_interrupt();
        }
    }

    fn run_sat_evaluations(&mut self, begin: i32, end: i32) {
        for line in begin..=end {
            self.sat_evaluation(line);
        }
    }

    fn run_sat_evaluations_begin(&mut self, vb: i32, hb: i32, ve: i32, he: i32) {
        let begin = vb + (hb >= COUNTS_TO_RENDER_LINE) as i32;
        let end = (ve - (he < COUNTS_TO_RENDER_LINE) as i32).min(FIRST_VISIBLE_LINE - 1);
        self.run_sat_evaluations(begin, end);
    }

    fn run_sat_evaluations_end(&mut self, vb: i32, hb: i32, ve: i32, he: i32) {
        let begin = (vb + (hb >= COUNTS_TO_RENDER_LINE) as i32).max(END_VISIBLE_LINE);
        let end = (ve - (he < COUNTS_TO_RENDER_LINE) as i32).min(191);
        self.run_sat_evaluations(begin, end);
    }

    fn init_active_display(&mut self) {
        self.regs.row = self.regs.row_temp;
        self.regs.fy = self.regs.fy_temp;
    }

    fn run_last_part(&mut self, ve: i32, he: i32) {
        if ve != LINES_PER_FRAME {
            if he >= COUNTS_TO_INT_LINE {
                self.run_first_icount();
            }
        } else {
            self.run_first_icount();
            self.init_active_display();
        }
    }

    fn run_post_update_prev261(&mut self, ve: i32, he: i32, reload_pending: bool) {
        if ve < 261 {
            if reload_pending && he >= COUNTS_TO_INT_LINE {
                self.line_int_counter = self.regs.line_counter as i32;
            }
        } else {
            if reload_pending {
                self.line_int_counter = self.regs.line_counter as i32;
            }
            self.run_last_part(ve, he);
        }
    }

    fn run_post_update_prev192b(&mut self, vb: i32, hb: i32, ve: i32, he: i32) {
        if ve < 192 {
            self.run_icounts(vb, hb, ve, he);
            if he >= COUNTS_TO_INT_LINE {
                self.raise_frame_interrupt();
            }
        } else {
            self.raise_frame_interrupt();
            self.run_icounts_end(vb, hb);
            self.run_post_update_prev261(ve, he, true);
        }
    }

    fn run_post_update_prev192(&mut self, vb: i32, hb: i32, ve: i32, he: i32) {
        self.run_sat_evaluations_end(vb, hb, ve, he);
        if ve < 191 {
            self.run_icounts(vb, hb, ve, he);
        } else {
            self.run_post_update_prev192b(vb, hb, ve, he);
        }
    }

    fn render_lines(&mut self, lines: i32) {
        for _ in 0..lines {
            self.render_line();
        }
    }

    /// Advance from (vb, hb) to (ve, he) within one frame; ve may be 262
    fn run(&mut self, vb: i32, hb: i32, ve: i32, he: i32, display: &mut dyn DisplaySink) {
        if vb < FIRST_VISIBLE_LINE {
            self.run_sat_evaluations_begin(vb, hb, ve, he);
            if ve < FIRST_VISIBLE_LINE {
                self.run_icounts(vb, hb, ve, he);
                return;
            }
            self.render.cursor = 0;
            self.render.lines = FIRST_VISIBLE_LINE;
            if ve < END_VISIBLE_LINE {
                self.run_icounts(vb, hb, ve, he);
                self.render_lines(ve - FIRST_VISIBLE_LINE + (he >= COUNTS_TO_RENDER_LINE) as i32);
            } else {
                self.render_lines(SCREEN_HEIGHT as i32);
                self.deliver_frame(display);
                self.run_post_update_prev192(vb, hb, ve, he);
            }
        } else if vb < END_VISIBLE_LINE {
            if ve < END_VISIBLE_LINE {
                self.run_icounts(vb, hb, ve, he);
                self.render_lines(
                    ve - vb + (he >= COUNTS_TO_RENDER_LINE) as i32
                        - (hb >= COUNTS_TO_RENDER_LINE) as i32,
                );
            } else {
                self.render_lines(END_VISIBLE_LINE - vb - (hb >= COUNTS_TO_RENDER_LINE) as i32);
                self.deliver_frame(display);
                self.run_post_update_prev192(vb, hb, ve, he);
            }
        } else if vb < 191 {
            self.run_post_update_prev192(vb, hb, ve, he);
        } else if vb < 192 {
            if hb >= COUNTS_TO_INT_LINE {
                self.run_post_update_prev261(ve, he, true);
            } else {
                self.run_sat_evaluations_end(vb, hb, ve, he);
                self.run_post_update_prev192b(vb, hb, ve, he);
            }
        } else if vb < 260 {
            self.run_post_update_prev261(ve, he, true);
        } else if vb < 261 {
            self.run_post_update_prev261(ve, he, hb < COUNTS_TO_INT_LINE);
        } else if vb < LINES_PER_FRAME {
            if hb < COUNTS_TO_INT_LINE {
                self.run_last_part(ve, he);
            } else if ve == LINES_PER_FRAME {
                self.init_active_display();
            }
        } else {
            self.init_active_display();
        }
    }

    /// Recompute the countdown to the next line interrupt from the current
    /// beam position
    fn update_cc_to_line_int(&mut self) {
        // Shift the frame so that counter events fall on line starts
        let (v, h) = if self.timing.h >= COUNTS_TO_INT_LINE {
            let v = if self.timing.v == 261 { 0 } else { self.timing.v + 1 };
            (v, self.timing.h - COUNTS_TO_INT_LINE)
        } else {
            (
                self.timing.v,
                COUNTS_PER_LINE - (COUNTS_TO_INT_LINE - self.timing.h),
            )
        };

        let mut counts = self.line_int_counter + 1;
        if v >= 192 || v + counts > 192 {
            counts = (LINES_PER_FRAME - v) + self.regs.line_counter as i32;
        }
        self.timing.cc_to_line_int = 4 * (counts * COUNTS_PER_LINE - h);
    }

    fn update_cc_to_frame_int(&mut self) {
        let t = &mut self.timing;
        t.cc_to_frame_int = if t.v > 191 || (t.v == 191 && t.h >= COUNTS_TO_INT_LINE) {
            4 * ((LINES_PER_FRAME - (t.v - 191)) * COUNTS_PER_LINE + COUNTS_TO_INT_LINE - t.h)
        } else {
            4 * ((191 - t.v) * COUNTS_PER_LINE + COUNTS_TO_INT_LINE - t.h)
        };
    }

    /// Convert pending cycles into beam movement, processing every line
    /// boundary crossed on the way
    fn catch_up(&mut self, display: &mut dyn DisplaySink) {
        let t = &mut self.timing;
        t.cc_to_line_int -= t.cc;
        t.cc_to_frame_int -= t.cc;
        let mut new_v = t.v + t.cc / (COUNTS_PER_LINE * 4);
        t.cc %= COUNTS_PER_LINE * 4;
        let mut new_h = t.h + t.cc / 4;
        if new_h >= COUNTS_PER_LINE {
            new_v += 1;
            new_h -= COUNTS_PER_LINE;
        }
        t.cc %= 4;
        t.cc_to_line_int += t.cc;
        t.cc_to_frame_int += t.cc;

        while new_v >= LINES_PER_FRAME {
            self.run(self.timing.v, self.timing.h, LINES_PER_FRAME, 0, display);
            new_v -= LINES_PER_FRAME;
            self.timing.v = 0;
            self.timing.h = 0;
        }
        self.run(self.timing.v, self.timing.h, new_v, new_h, display);
        self.timing.v = new_v;
        self.timing.h = new_h;

        if self.timing.cc_to_line_int <= 0 {
            self.update_cc_to_line_int();
        }
        if self.timing.cc_to_frame_int <= 0 {
            self.update_cc_to_frame_int();
        }
    }
}

/// Line counter events between two positions of the same frame
fn icounts(vb: i32, hb: i32, ve: i32, he: i32) -> i32 {
    ve - vb + (he >= COUNTS_TO_INT_LINE) as i32 - (hb >= COUNTS_TO_INT_LINE) as i32
}
