// kernel/src/boot/sector.rs
//
// Boot media: sector checks and CHS addressing for the 1.44M floppy
// geometry the stages are read from.
//
// - BootSector::parse checks size, 0x55 0xAA at offset 510, and reports
//   the leading jump and code density
// - ChsReads splits an LBA range into reads that never cross a track,
//   since the firmware disk service can't

use core::fmt;

use crate::mem::layout::{BOOT_SECTOR_SIZE, BOOT_SIGNATURE, SECTOR_SIZE};

pub const SECTORS_PER_TRACK: u32 = 18;
pub const HEADS: u32 = 2;
pub const CYLINDERS: u32 = 80;
pub const TOTAL_SECTORS: u32 = SECTORS_PER_TRACK * HEADS * CYLINDERS;

/// Below this share of non-zero bytes (percent) a sector is unlikely to
/// hold a real loader.
pub const LOW_DENSITY_PERCENT: u32 = 10;

const JMP_SHORT: u8 = 0xEB;
const JMP_NEAR: u8 = 0xE9;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectorError {
    WrongSize(usize),
    BadSignature(u16),
    BeyondDisk(u32),
    /// Sector 0, a sector past the track, or a head the drive lacks.
    BadChs(Chs),
}

impl fmt::Display for SectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectorError::WrongSize(n) => write!(f, "boot sector is {} bytes, expected 512", n),
            SectorError::BadSignature(sig) => write!(f, "boot signature {:#06x}, expected 0xaa55", sig),
            SectorError::BeyondDisk(lba) => write!(f, "LBA {} is past the end of the disk", lba),
            SectorError::BadChs(chs) => write!(
                f,
                "no such CHS address: cylinder {} head {} sector {}",
                chs.cylinder, chs.head, chs.sector
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootSector<'a> {
    bytes: &'a [u8],
}

impl<'a> BootSector<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, SectorError> {
        if bytes.len() != BOOT_SECTOR_SIZE {
            return Err(SectorError::WrongSize(bytes.len()));
        }
        let sig = u16::from_le_bytes([bytes[510], bytes[511]]);
        if sig != BOOT_SIGNATURE {
            return Err(SectorError::BadSignature(sig));
        }
        Ok(BootSector { bytes })
    }

    pub fn starts_with_jump(&self) -> bool {
        matches!(self.bytes[0], JMP_SHORT | JMP_NEAR)
    }

    pub fn non_zero_bytes(&self) -> usize {
        self.bytes.iter().filter(|&&b| b != 0).count()
    }

    /// Non-zero bytes as a whole percentage of the sector.
    pub fn density_percent(&self) -> u32 {
        (self.non_zero_bytes() * 100 / BOOT_SECTOR_SIZE) as u32
    }

    pub fn looks_like_code(&self) -> bool {
        self.starts_with_jump() && self.density_percent() >= LOW_DENSITY_PERCENT
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chs {
    pub cylinder: u16,
    pub head: u8,
    /// 1-based.
    pub sector: u8,
}

pub fn lba_to_chs(lba: u32) -> Result<Chs, SectorError> {
    if lba >= TOTAL_SECTORS {
        return Err(SectorError::BeyondDisk(lba));
    }
    Ok(Chs {
        cylinder: (lba / (SECTORS_PER_TRACK * HEADS)) as u16,
        head: ((lba / SECTORS_PER_TRACK) % HEADS) as u8,
        sector: (lba % SECTORS_PER_TRACK + 1) as u8,
    })
}

/// CHS sectors count from 1.
pub fn chs_to_lba(chs: Chs) -> Result<u32, SectorError> {
    let sector_index = match (chs.sector as u32).checked_sub(1) {
        Some(i) if i < SECTORS_PER_TRACK && (chs.head as u32) < HEADS => i,
        _ => return Err(SectorError::BadChs(chs)),
    };
    let lba = (chs.cylinder as u32 * HEADS + chs.head as u32) * SECTORS_PER_TRACK + sector_index;
    if lba >= TOTAL_SECTORS {
        return Err(SectorError::BeyondDisk(lba));
    }
    Ok(lba)
}

/// One firmware read: `count` sectors from `start` into `dest`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChsRead {
    pub start: Chs,
    pub count: u8,
    pub dest: u64,
}

/// Track-sized pieces of an LBA range.
pub struct ChsReads {
    lba: u32,
    remaining: u32,
    dest: u64,
}

impl ChsReads {
    pub fn new(start_lba: u32, count: u32, dest: u64) -> Result<Self, SectorError> {
        if count > 0 {
            let last = start_lba.checked_add(count - 1).ok_or(SectorError::BeyondDisk(u32::MAX))?;
            lba_to_chs(last)?;
        }
        Ok(ChsReads {
            lba: start_lba,
            remaining: count,
            dest,
        })
    }
}

impl Iterator for ChsReads {
    type Item = ChsRead;

    fn next(&mut self) -> Option<ChsRead> {
        if self.remaining == 0 {
            return None;
        }
        let start = lba_to_chs(self.lba).ok()?;
        let left_on_track = SECTORS_PER_TRACK - (start.sector as u32 - 1);
        let count = left_on_track.min(self.remaining);

        let read = ChsRead {
            start,
            count: count as u8,
            dest: self.dest,
        };
        self.lba += count;
        self.remaining -= count;
        self.dest += count as u64 * SECTOR_SIZE as u64;
        Some(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sector_with(first: u8, fill: usize) -> Vec<u8> {
        let mut s = vec![0u8; 512];
        s[0] = first;
        for b in s.iter_mut().take(fill).skip(1) {
            *b = 0x90;
        }
        s[510] = 0x55;
        s[511] = 0xAA;
        s
    }

    #[test]
    fn signature_and_size_are_required() {
        let good = sector_with(0xEB, 200);
        assert!(BootSector::parse(&good).is_ok());

        let mut bad = good.clone();
        bad[511] = 0;
        assert_eq!(BootSector::parse(&bad), Err(SectorError::BadSignature(0x0055)));
        assert_eq!(BootSector::parse(&good[..511]), Err(SectorError::WrongSize(511)));
    }

    #[test]
    fn density_and_jump_heuristics() {
        let s = sector_with(0xEB, 200);
        let bs = BootSector::parse(&s).unwrap();
        assert!(bs.starts_with_jump());
        assert_eq!(bs.non_zero_bytes(), 202);
        assert_eq!(bs.density_percent(), 39);
        assert!(bs.looks_like_code());

        let sparse = sector_with(0xE9, 10);
        assert!(!BootSector::parse(&sparse).unwrap().looks_like_code());
        let no_jump = sector_with(0xFA, 300);
        assert!(!BootSector::parse(&no_jump).unwrap().looks_like_code());
    }

    #[test]
    fn chs_conversion() {
        assert_eq!(lba_to_chs(0), Ok(Chs { cylinder: 0, head: 0, sector: 1 }));
        assert_eq!(lba_to_chs(17), Ok(Chs { cylinder: 0, head: 0, sector: 18 }));
        assert_eq!(lba_to_chs(18), Ok(Chs { cylinder: 0, head: 1, sector: 1 }));
        assert_eq!(lba_to_chs(36), Ok(Chs { cylinder: 1, head: 0, sector: 1 }));
        assert_eq!(lba_to_chs(2879).and_then(chs_to_lba), Ok(2879));
        assert_eq!(lba_to_chs(2880), Err(SectorError::BeyondDisk(2880)));
    }

    #[test]
    fn impossible_chs_addresses_are_rejected() {
        let zero = Chs { cylinder: 0, head: 0, sector: 0 };
        assert_eq!(chs_to_lba(zero), Err(SectorError::BadChs(zero)));

        let past_track = Chs { cylinder: 3, head: 1, sector: 19 };
        assert_eq!(chs_to_lba(past_track), Err(SectorError::BadChs(past_track)));

        let third_head = Chs { cylinder: 0, head: 2, sector: 1 };
        assert_eq!(chs_to_lba(third_head), Err(SectorError::BadChs(third_head)));

        let past_disk = Chs { cylinder: 80, head: 0, sector: 1 };
        assert_eq!(chs_to_lba(past_disk), Err(SectorError::BeyondDisk(2880)));
    }

    #[test]
    fn reads_split_at_track_boundaries() {
        let reads: Vec<ChsRead> = ChsReads::new(2, 40, 0x8000).unwrap().collect();
        assert_eq!(reads.len(), 3);
        assert_eq!(reads[0].start, Chs { cylinder: 0, head: 0, sector: 3 });
        assert_eq!(reads[0].count, 16);
        assert_eq!(reads[1].start, Chs { cylinder: 0, head: 1, sector: 1 });
        assert_eq!(reads[1].dest, 0x8000 + 16 * 512);
        assert_eq!(reads[2].count, 6);
        assert_eq!(reads.iter().map(|r| r.count as u32).sum::<u32>(), 40);

        assert!(ChsReads::new(2870, 20, 0).is_err());
        assert_eq!(ChsReads::new(5, 0, 0).unwrap().count(), 0);
    }
}
