//! Cartridge ROM image and header

use crate::error::GgError;
use serde::Serialize;

/// Size of one ROM bank
pub const BANK_SIZE: usize = 0x4000;

const HEADER_MAGIC: &[u8; 8] = b"TMR SEGA";
const HEADER_OFFSETS: [usize; 3] = [0x1FF0, 0x3FF0, 0x7FF0];

/// Immutable, bank-aligned ROM image
#[derive(Debug, Clone)]
pub struct Rom {
    data: Vec<u8>,
}

impl Rom {
    /// Copy a raw image into fresh storage
    ///
    /// The length must be a non-zero multiple of [`BANK_SIZE`].
    pub fn new(image: &[u8]) -> Result<Self, GgError> {
        if image.is_empty() || image.len() % BANK_SIZE != 0 {
            return Err(GgError::InvalidRomSize(image.len()));
        }
        let mut data = Vec::new();
        data.try_reserve_exact(image.len())
            .map_err(|_| GgError::OutOfMemory)?;
        data.extend_from_slice(image);
        Ok(Self { data })
    }

    pub fn bank_count(&self) -> u32 {
        (self.data.len() / BANK_SIZE) as u32
    }

    /// Byte `offset` (< 16 KiB) of `bank`
    #[inline]
    pub fn read(&self, bank: u32, offset: u16) -> u8 {
        self.data[bank as usize * BANK_SIZE + (offset as usize & (BANK_SIZE - 1))]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Best-effort header lookup
    pub fn header(&self) -> Option<RomHeader> {
        let base = HEADER_OFFSETS
            .iter()
            .copied()
            .filter(|&off| off < 0x7FF0 || self.bank_count() > 1)
            .find(|&off| self.data.get(off..off + 8) == Some(&HEADER_MAGIC[..]))?;
        let mem = &self.data[base..base + 16];

        let product_code = (mem[0xC] & 0xF) as u32
            + (mem[0xC] >> 4) as u32 * 10
            + (mem[0xD] & 0xF) as u32 * 100
            + (mem[0xD] >> 4) as u32 * 1000
            + (mem[0xE] >> 4) as u32 * 10000;

        Some(RomHeader {
            checksum: u16::from_le_bytes([mem[0xA], mem[0xB]]),
            product_code,
            version: mem[0xE] & 0xF,
            region: Region::from_code(mem[0xF] >> 4),
            size_kb: rom_size_kb(mem[0xF] & 0xF),
        })
    }
}

/// Region declared in the cartridge header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Region {
    SmsJapan,
    SmsExport,
    GgJapan,
    GgExport,
    GgInternational,
    Unknown,
}

impl Region {
    fn from_code(code: u8) -> Self {
        match code {
            3 => Region::SmsJapan,
            4 => Region::SmsExport,
            5 => Region::GgJapan,
            6 => Region::GgExport,
            7 => Region::GgInternational,
            _ => Region::Unknown,
        }
    }
}

fn rom_size_kb(code: u8) -> Option<u32> {
    match code {
        0x0 => Some(256),
        0x1 => Some(512),
        0x2 => Some(1024),
        0xA => Some(8),
        0xB => Some(16),
        0xC => Some(32),
        0xD => Some(48),
        0xE => Some(64),
        0xF => Some(128),
        _ => None,
    }
}

/// Decoded `TMR SEGA` header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RomHeader {
    pub checksum: u16,
    /// BCD product code, decoded
    pub product_code: u32,
    pub version: u8,
    pub region: Region,
    /// Declared ROM size; `None` for an unknown size code
    pub size_kb: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_with_header(banks: usize, at: usize) -> Vec<u8> {
        let mut data = vec![0u8; banks * BANK_SIZE];
        data[at..at + 8].copy_from_slice(HEADER_MAGIC);
        data[at + 0xA] = 0x34;
        data[at + 0xB] = 0x12;
        // Product 2_5113, version 1
        data[at + 0xC] = 0x13;
        data[at + 0xD] = 0x51;
        data[at + 0xE] = 0x21;
        // GG export, 128 KiB
        data[at + 0xF] = 0x6F;
        data
    }

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(matches!(Rom::new(&[]), Err(GgError::InvalidRomSize(0))));
        assert!(matches!(
            Rom::new(&[0; 1000]),
            Err(GgError::InvalidRomSize(1000))
        ));
        assert!(matches!(
            Rom::new(&vec![0; BANK_SIZE + 1]),
            Err(GgError::InvalidRomSize(_))
        ));
    }

    #[test]
    fn test_bank_count_and_read() {
        let mut image = vec![0u8; 3 * BANK_SIZE];
        image[2 * BANK_SIZE + 5] = 0xAB;
        let rom = Rom::new(&image).unwrap();
        assert_eq!(rom.bank_count(), 3);
        assert_eq!(rom.read(2, 5), 0xAB);
    }

    #[test]
    fn test_header_decoding() {
        let rom = Rom::new(&image_with_header(2, 0x7FF0)).unwrap();
        let header = rom.header().unwrap();
        assert_eq!(header.checksum, 0x1234);
        assert_eq!(header.product_code, 25113);
        assert_eq!(header.version, 1);
        assert_eq!(header.region, Region::GgExport);
        assert_eq!(header.size_kb, Some(128));
    }

    #[test]
    fn test_header_missing_or_unknown_fields() {
        let rom = Rom::new(&vec![0; BANK_SIZE]).unwrap();
        assert!(rom.header().is_none());

        let mut image = image_with_header(1, 0x1FF0);
        image[0x1FFF] = 0x95;
        let header = Rom::new(&image).unwrap().header().unwrap();
        assert_eq!(header.region, Region::Unknown);
        assert_eq!(header.size_kb, None);
    }
}
