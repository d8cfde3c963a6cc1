//! Chipset behaviour observed through the public port interface

use emu_gg::{Chipset, GgConfig, Host, Rom, Vdp, BANK_SIZE};
use std::cell::RefCell;
use std::rc::Rc;

const CYCLES_PER_LINE: u32 = 228;
const LINES_PER_FRAME: usize = 262;

const STATUS_FRAME: u8 = 0x80;
const STATUS_OVERFLOW: u8 = 0x40;
const STATUS_COLLISION: u8 = 0x20;

/// ROM whose banks are tagged with their number in the first byte
fn chipset(banks: usize) -> Chipset {
    let mut image = vec![0u8; banks * BANK_SIZE];
    for bank in 0..banks {
        image[bank * BANK_SIZE] = 0xB0 | bank as u8;
    }
    Chipset::new(Rom::new(&image).unwrap(), &GgConfig::default())
}

fn write_reg(vdp: &mut Vdp, reg: u8, value: u8, host: &mut Host) {
    vdp.write_control(value, host);
    vdp.write_control(0x80 | reg, host);
}

fn write_vram(vdp: &mut Vdp, addr: u16, bytes: &[u8], host: &mut Host) {
    vdp.write_control(addr as u8, host);
    vdp.write_control(0x40 | (addr >> 8) as u8, host);
    for &b in bytes {
        vdp.write_data(b, host);
    }
}

/// Scanlines on which a line interrupt fired during the second frame after
/// programming the line counter with `n`
fn line_interrupt_lines(n: u8) -> Vec<usize> {
    let mut host = Host::new();
    let mut chips = chipset(2);
    write_reg(&mut chips.vdp, 0, 0x10, &mut host);
    write_reg(&mut chips.vdp, 10, n, &mut host);

    let mut lines = Vec::new();
    for step in 0..2 * LINES_PER_FRAME {
        chips.clock(CYCLES_PER_LINE, &mut host);
        if chips.vdp.irq_line() {
            if step >= LINES_PER_FRAME {
                lines.push(step - LINES_PER_FRAME);
            }
            chips.vdp.read_status(&mut host);
        }
    }
    lines
}

#[test]
fn test_frame_interrupt_once_per_frame() {
    let mut host = Host::new();
    let mut chips = chipset(2);
    write_reg(&mut chips.vdp, 1, 0x20, &mut host);

    let mut interrupts = Vec::new();
    for step in 0..3 * LINES_PER_FRAME {
        chips.clock(CYCLES_PER_LINE, &mut host);
        if chips.vdp.irq_line() {
            interrupts.push(step);
            assert_ne!(chips.vdp.read_status(&mut host) & STATUS_FRAME, 0);
        }
    }
    // Raised while crossing line 191
    assert_eq!(interrupts, vec![191, 191 + 262, 191 + 2 * 262]);
}

#[test]
fn test_frame_interrupt_masked_without_enable() {
    let mut host = Host::new();
    let mut chips = chipset(2);
    for _ in 0..LINES_PER_FRAME {
        chips.clock(CYCLES_PER_LINE, &mut host);
        assert!(!chips.vdp.irq_line());
    }
    assert_ne!(chips.vdp.read_status(&mut host) & STATUS_FRAME, 0);
}

#[test]
fn test_line_interrupt_every_line() {
    let lines = line_interrupt_lines(0);
    assert_eq!(lines, (0..192).collect::<Vec<_>>());
}

#[test]
fn test_line_interrupt_every_other_line() {
    let lines = line_interrupt_lines(1);
    assert_eq!(lines.len(), 96);
    assert_eq!(lines[0], 0);
    assert!(lines.windows(2).all(|w| w[1] - w[0] == 2));
}

#[test]
fn test_line_interrupt_never_reached() {
    assert!(line_interrupt_lines(254).is_empty());
}

/// Display on, name table 0x3800, sprite table 0x3F00, patterns at 0x0000;
/// sprite pattern 1 is a solid colour 1 row
fn sprite_scene(sprites: &[(u8, u8)]) -> (Chipset, Host) {
    let mut host = Host::new();
    let mut chips = chipset(2);
    let vdp = &mut chips.vdp;
    write_reg(vdp, 1, 0x40, &mut host);
    write_reg(vdp, 2, 0xFF, &mut host);
    write_reg(vdp, 5, 0xFF, &mut host);
    write_vram(vdp, 0x0020, &[0xFF, 0, 0, 0].repeat(8), &mut host);

    for (i, &(x, y)) in sprites.iter().enumerate() {
        write_vram(vdp, 0x3F00 + i as u16, &[y], &mut host);
        write_vram(vdp, 0x3F80 + 2 * i as u16, &[x, 1], &mut host);
    }
    write_vram(vdp, 0x3F00 + sprites.len() as u16, &[0xD0], &mut host);
    (chips, host)
}

fn run_frame(chips: &mut Chipset, host: &mut Host) -> u8 {
    chips.clock(CYCLES_PER_LINE * LINES_PER_FRAME as u32, host);
    chips.vdp.read_status(host)
}

#[test]
fn test_sprite_overflow_past_hardware_limit() {
    let eight: Vec<(u8, u8)> = (0..8).map(|i| (40 + 10 * i, 80)).collect();
    let (mut chips, mut host) = sprite_scene(&eight);
    assert_eq!(run_frame(&mut chips, &mut host) & STATUS_OVERFLOW, 0);

    let nine: Vec<(u8, u8)> = (0..9).map(|i| (40 + 10 * i, 80)).collect();
    let (mut chips, mut host) = sprite_scene(&nine);
    assert_ne!(run_frame(&mut chips, &mut host) & STATUS_OVERFLOW, 0);
}

#[test]
fn test_sprite_collision_on_overlap_only() {
    let (mut chips, mut host) = sprite_scene(&[(60, 80), (80, 80)]);
    assert_eq!(run_frame(&mut chips, &mut host) & STATUS_COLLISION, 0);

    let (mut chips, mut host) = sprite_scene(&[(60, 80), (64, 80)]);
    assert_ne!(run_frame(&mut chips, &mut host) & STATUS_COLLISION, 0);
}

#[test]
fn test_frame_delivered_once_per_frame() {
    let frames = Rc::new(RefCell::new(0));
    let count = Rc::clone(&frames);
    let mut host = Host::new().with_display(move |frame: &[u16]| {
        assert_eq!(frame.len(), emu_gg::FRAME_PIXELS);
        *count.borrow_mut() += 1;
    });
    let mut chips = chipset(2);
    for _ in 0..3 * LINES_PER_FRAME {
        chips.clock(CYCLES_PER_LINE, &mut host);
    }
    assert_eq!(*frames.borrow(), 3);
}

type Blocks = Rc<RefCell<Vec<(Vec<f64>, Vec<f64>)>>>;

fn audio_host() -> (Host, Blocks) {
    let blocks: Blocks = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&blocks);
    let host = Host::new().with_audio(move |left: &[f64], right: &[f64]| {
        sink.borrow_mut().push((left.to_vec(), right.to_vec()));
    });
    (host, blocks)
}

/// Tone 0 at full volume with a short period
fn loud_tone(chips: &mut Chipset, host: &mut Host) {
    chips.psg.write(0x80 | 0x04, host);
    chips.psg.write(0x01, host);
    chips.psg.write(0x90, host);
}

#[test]
fn test_zero_stereo_mask_is_silent() {
    let (mut host, blocks) = audio_host();
    let mut chips = chipset(2);
    loud_tone(&mut chips, &mut host);
    chips.psg.write_stereo(0x00, &mut host);
    chips.clock(2238 * 16, &mut host);

    let blocks = blocks.borrow();
    assert_eq!(blocks.len(), 1);
    assert!(blocks[0].0.iter().all(|&s| s == 0.0));
    assert!(blocks[0].1.iter().all(|&s| s == 0.0));
}

#[test]
fn test_stereo_masks_select_sides() {
    let (mut host, blocks) = audio_host();
    let mut chips = chipset(2);
    loud_tone(&mut chips, &mut host);
    // Tone 0 on the left only
    chips.psg.write_stereo(0x10, &mut host);
    chips.clock(2238 * 16, &mut host);

    let blocks = blocks.borrow();
    assert!(blocks[0].0.iter().any(|&s| s > 0.0));
    assert!(blocks[0].1.iter().all(|&s| s == 0.0));
}

#[test]
fn test_power_on_banks_by_rom_size() {
    assert_eq!(chipset(1).mapper.active_banks().banks, [0, 0, 0]);
    assert_eq!(chipset(2).mapper.active_banks().banks, [0, 1, 1]);
    assert_eq!(chipset(8).mapper.active_banks().banks, [0, 1, 2]);
}

#[test]
fn test_bank_select_pages_rom() {
    let mut host = Host::new();
    let mut chips = chipset(8);
    assert_eq!(chips.mapper.read(0x8000, &mut host), 0xB2);

    chips.mapper.write(0xFFFF, 5, &mut host);
    assert_eq!(chips.mapper.read(0x8000, &mut host), 0xB5);
    chips.mapper.write(0xFFFE, 7, &mut host);
    assert_eq!(chips.mapper.read(0x4000, &mut host), 0xB7);
    // Bank numbers wrap at the ROM size
    chips.mapper.write(0xFFFD, 9, &mut host);
    assert_eq!(chips.mapper.active_banks().banks[0], 1);
    // The first KiB stays on bank 0
    assert_eq!(chips.mapper.read(0x0000, &mut host), 0xB0);
    // Control registers are written through to RAM
    assert_eq!(chips.mapper.read(0xFFFF, &mut host), 5);
}

#[test]
fn test_cartridge_ram_from_provider() {
    let mut host = Host::new().with_external_ram(|| vec![0xAA; 0x8000]);
    let mut chips = chipset(4);
    assert!(chips.mapper.external_ram().is_none());

    // Cartridge RAM in slot 2, upper half
    chips.mapper.write(0xFFFC, 0x0C, &mut host);
    assert_eq!(chips.mapper.read(0x8000, &mut host), 0xAA);
    chips.mapper.write(0x8001, 0x55, &mut host);
    assert_eq!(chips.mapper.external_ram().unwrap()[0x4001], 0x55);

    // Back to ROM; the RAM contents survive
    chips.mapper.write(0xFFFC, 0x00, &mut host);
    assert_eq!(chips.mapper.read(0x8000, &mut host), 0xB2);
    assert_eq!(chips.mapper.external_ram().unwrap()[0x4001], 0x55);
}
