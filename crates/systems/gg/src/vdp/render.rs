//! Scanline renderer and sprite evaluation

use super::{SpriteEntry, Vdp, MAX_SPRITES, SCREEN_WIDTH, STATUS_COLLISION, STATUS_OVERFLOW};

// Name table entry bits
const HFLIP: u16 = 0x200;
const VFLIP: u16 = 0x400;
const PALETTE: u16 = 0x800;
const PRIORITY: u16 = 0x1000;

/// Sprite colour index meaning "no pixel"
const TRANSPARENT: u8 = 0x10;

/// Leftmost sprite column visible on the LCD
const SPRITE_SCREEN_OFFSET: usize = 48;

/// First name table column fetched, one left of the visible area
const FIRST_COLUMN: u16 = 6 - 1;

/// Sixteen-pixel window over the previous and current tile rows
///
/// The high byte of every plane holds the previous tile and the low byte
/// the one being fetched; fine X selects where the 8-pixel read starts.
struct TileShifter {
    planes: [u16; 4],
    palette: u16,
    priority: u16,
}

impl TileShifter {
    fn load(row: [u8; 4], entry: u16) -> Self {
        Self {
            planes: row.map(|b| (b as u16) << 8),
            palette: if entry & PALETTE != 0 { 0xFF00 } else { 0 },
            priority: if entry & PRIORITY != 0 { 0xFF00 } else { 0 },
        }
    }

    fn feed(&mut self, row: [u8; 4], entry: u16) {
        for (plane, b) in self.planes.iter_mut().zip(row) {
            *plane |= b as u16;
        }
        if entry & PALETTE != 0 {
            self.palette |= 0xFF;
        }
        if entry & PRIORITY != 0 {
            self.priority |= 0xFF;
        }
    }

    /// Colour index (palette bit 4) and priority of the next pixel
    fn shift_out(&mut self, fx: u8) -> (u8, bool) {
        let d0 = 7 + fx as u32;
        let color = ((self.planes[0] >> d0) & 0x01)
            | ((self.planes[1] >> (d0 - 1)) & 0x02)
            | ((self.planes[2] >> (d0 - 2)) & 0x04)
            | ((self.planes[3] >> (d0 - 3)) & 0x08)
            | ((self.palette >> (d0 - 4)) & 0x10);
        let priority = (self.priority >> d0) & 1 != 0;
        for plane in &mut self.planes {
            *plane <<= 1;
        }
        self.palette <<= 1;
        self.priority <<= 1;
        (color as u8, priority)
    }
}

impl Vdp {
    /// Name table entry at `row | col`, advancing `col` with wraparound
    fn next_name(&self, addr_row: u16, addr_col: &mut u16) -> u16 {
        let addr = (addr_row | *addr_col) as usize;
        let entry = self.vram[addr] as u16 | (self.vram[addr | 1] as u16) << 8;
        *addr_col += 2;
        if *addr_col == 64 {
            *addr_col = 0;
        }
        entry
    }

    /// The four bitplanes of one tile row, flipped as the entry requests
    fn tile_row(&self, entry: u16, sel_bp: u16) -> [u8; 4] {
        let sel = if entry & VFLIP != 0 { 28 - sel_bp } else { sel_bp };
        let addr = (((entry & 0x1FF) << 5) | sel) as usize;
        let row = [
            self.vram[addr],
            self.vram[addr | 1],
            self.vram[addr | 2],
            self.vram[addr | 3],
        ];
        if entry & HFLIP != 0 {
            row.map(u8::reverse_bits)
        } else {
            row
        }
    }

    fn render_line_bg(&mut self) {
        let regs = &self.regs;
        let mut row = self.render.lines + (((regs.row as i32) << 3) | regs.fy as i32);
        if row >= 224 {
            row -= 224;
        }
        let mut addr_row = ((row & 0xF8) << 3) as u16 | regs.nt_addr;
        let sel_bp = ((row & 0x7) << 2) as u16;
        let fx = regs.fx;

        let mut addr_col = ((32 - regs.col as u16) + FIRST_COLUMN) << 1;
        if addr_col >= 64 {
            addr_col -= 64;
        }

        let entry = self.next_name(addr_row, &mut addr_col);
        let mut shifter = TileShifter::load(self.tile_row(entry, sel_bp), entry);

        let mut bg = [0u8; SCREEN_WIDTH];
        let mut priority = [false; SCREEN_WIDTH];
        let mut x = 0;
        for column in 6..26 {
            if column == 24 && self.regs.mvs {
                // Rightmost two columns ignore vertical scroll; refetch the
                // previous tile from the unscrolled row
                addr_row = ((self.render.lines & 0xF8) << 3) as u16 | self.regs.nt_addr;
                addr_col = if addr_col == 0 { 62 } else { addr_col - 2 };
                let entry = self.next_name(addr_row, &mut addr_col);
                shifter = TileShifter::load(self.tile_row(entry, sel_bp), entry);
            }
            let entry = self.next_name(addr_row, &mut addr_col);
            shifter.feed(self.tile_row(entry, sel_bp), entry);
            for _ in 0..8 {
                let (color, prio) = shifter.shift_out(fx);
                bg[x] = color;
                priority[x] = prio;
                x += 1;
            }
        }
        self.scratch.bg = bg;
        self.scratch.priority = priority;
    }

    fn render_line_spr(&mut self) {
        let mut line = [TRANSPARENT; 256];
        let mut collision = false;
        let sat_addr = self.regs.sat_addr as usize + 128;
        let mask = if self.sprites.size { 0xFE } else { 0xFF };

        for entry in self.sprites.entries.iter().rev() {
            let attr = sat_addr + ((entry.index as usize) << 1);
            let pattern = (self.vram[attr + 1] & mask) as u16;
            let addr = (self.regs.spg_addr | (pattern << 5) | entry.row_offset) as usize;
            let mut planes = [
                self.vram[addr],
                self.vram[addr + 1],
                self.vram[addr + 2],
                self.vram[addr + 3],
            ];

            let mut x = self.vram[attr] as i32;
            if self.regs.ec {
                x -= 8;
            }

            let mut plot = |x: i32, color: u8| {
                if color != TRANSPARENT {
                    let px = &mut line[x as usize];
                    if *px != TRANSPARENT {
                        collision = true;
                    }
                    *px = color;
                }
            };

            if self.sprites.dsize {
                let mut i = 0;
                while x < 0 {
                    if i & 1 != 0 {
                        shift_planes(&mut planes);
                    }
                    x += 1;
                    i += 1;
                }
                let mut color = sprite_color(&planes);
                while i < 16 && x < 256 {
                    if i & 1 != 0 {
                        shift_planes(&mut planes);
                    } else {
                        color = sprite_color(&planes);
                    }
                    plot(x, color);
                    x += 1;
                    i += 1;
                }
            } else {
                let mut i = 0;
                while x < 0 {
                    shift_planes(&mut planes);
                    x += 1;
                    i += 1;
                }
                while i < 8 && x < 256 {
                    let color = sprite_color(&planes);
                    shift_planes(&mut planes);
                    plot(x, color);
                    x += 1;
                    i += 1;
                }
            }
        }

        self.scratch.sprites = line;
        if collision {
            self.status |= STATUS_COLLISION;
        }
    }

    fn color(&self, index: usize) -> u16 {
        (self.cram[index] as u16 | (self.cram[index | 1] as u16) << 8) & 0x0FFF
    }

    /// Render the next visible line into the frame buffer
    pub(super) fn render_line(&mut self) {
        let start = self.render.cursor;
        if self.regs.blank {
            let backdrop = self.color(((self.regs.backdrop | 0x10) as usize) << 1);
            self.render.fb[start..start + SCREEN_WIDTH].fill(backdrop);
        } else {
            self.render_line_bg();
            self.render_line_spr();
            for x in 0..SCREEN_WIDTH {
                let bg = self.scratch.bg[x];
                let spr = self.scratch.sprites[SPRITE_SCREEN_OFFSET + x];
                let index = if spr == TRANSPARENT || (bg & 0x0F != 0 && self.scratch.priority[x]) {
                    bg
                } else {
                    spr
                };
                self.render.fb[start + x] = self.color((index as usize) << 1);
            }
        }
        self.render.cursor += SCREEN_WIDTH;

        self.sat_evaluation(self.render.lines);
        self.render.lines += 1;
        self.regs.blank = self.regs.blank_latch;
        self.regs.col = self.regs.col_latch;
        self.regs.fx = self.regs.fx_latch;
    }

    /// Select the sprites that intersect the line after `line`
    pub(super) fn sat_evaluation(&mut self, line: i32) {
        let height = {
            let h = if self.regs.size { 16 } else { 8 };
            if self.regs.dsize {
                h << 1
            } else {
                h
            }
        };
        let halve = self.regs.dsize as u32;
        self.sprites.size = self.regs.size;
        self.sprites.dsize = self.regs.dsize;
        self.sprites.entries.clear();

        let base = self.regs.sat_addr as usize;
        for index in 0..MAX_SPRITES {
            let y = self.vram[base + index];
            if y == 0xD0 {
                break;
            }
            let diff = (line + ((y ^ 0xFF) as i32 | 0x100) + 1) & 0x1FF;
            if diff < height {
                if self.sprites.entries.len() == 8 {
                    self.status |= STATUS_OVERFLOW;
                }
                if self.sprites.entries.len() == self.sprite_limit {
                    break;
                }
                self.sprites.entries.push(SpriteEntry {
                    index: index as u8,
                    row_offset: ((diff as u32 >> halve) as u16) << 2,
                });
            }
        }
    }
}

/// Colour index of the leftmost pixel of a sprite row
fn sprite_color(planes: &[u8; 4]) -> u8 {
    TRANSPARENT
        | (planes[0] >> 7)
        | ((planes[1] >> 6) & 0x2)
        | ((planes[2] >> 5) & 0x4)
        | ((planes[3] >> 4) & 0x8)
}

fn shift_planes(planes: &mut [u8; 4]) {
    for plane in planes {
        *plane <<= 1;
    }
}
