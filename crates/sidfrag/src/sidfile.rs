//! PSID/RSID file header parsing.
//!
//! A `.sid` file opens with a big-endian structured header (124 bytes from
//! v2 on, 118 for v1): magic, version, C64 addresses, song bookkeeping, the
//! per-song speed bitmask, three 32-byte Latin-1 credit strings and, from
//! v2, a flags word carrying the video standard and the chip model of up to
//! three SIDs. The corpus driver reads it for metadata and to pick the
//! default clock per file; the payload (C64 program data) is not needed
//! here.

use crate::binutil::{
    ParseError, read_latin1, read_u8_at, read_u16_be_at, read_u32_be_at, read_slice,
};
use crate::chip::ChipClock;

/// Minimum header length (v1, without the flags block).
const V1_HEADER_LEN: usize = 0x76;
/// Full header length from v2 on.
const V2_HEADER_LEN: usize = 0x7C;

/// Video standard declared in the flags word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoStandard {
    #[default]
    Unknown,
    Pal,
    Ntsc,
    Both,
}

/// Chip model declared per SID in the flags word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SidModel {
    #[default]
    Unknown,
    Mos6581,
    Mos8580,
    Both,
}

/// Timer source driving the playroutine for one song.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongSpeed {
    /// Vertical-blank interrupt (the video frame grid).
    Vbi,
    /// CIA timer.
    Cia,
}

/// Parsed SID file header.
#[derive(Debug, Clone, PartialEq)]
pub struct SidHeader {
    /// True for RSID, false for PSID.
    pub is_rsid: bool,
    pub version: u16,
    pub data_offset: u16,
    pub load_address: u16,
    pub init_address: u16,
    pub play_address: u16,
    pub songs: u16,
    pub start_song: u16,
    /// Per-song speed bitmask: bit n clear = VBI, set = CIA timer.
    pub speed: u32,
    pub name: String,
    pub author: String,
    pub released: String,
    pub flags: u16,
    pub start_page: u8,
    pub page_length: u8,
    /// C64 addresses of the second and third SID, 0 when absent.
    pub second_sid_address: u16,
    pub third_sid_address: u16,
    pub video: VideoStandard,
    /// Declared model of each of the up to three SIDs.
    pub sid_model: [SidModel; 3],
}

fn decode_video(bits: u16) -> VideoStandard {
    match bits & 0x03 {
        1 => VideoStandard::Pal,
        2 => VideoStandard::Ntsc,
        3 => VideoStandard::Both,
        _ => VideoStandard::Unknown,
    }
}

fn decode_model(bits: u16) -> SidModel {
    match bits & 0x03 {
        1 => SidModel::Mos6581,
        2 => SidModel::Mos8580,
        3 => SidModel::Both,
        _ => SidModel::Unknown,
    }
}

/// Decode a SID address byte (header offsets $7A/$7B): valid even values in
/// $42..=$7F or $E0..=$FE map to `0xD000 | (byte << 4)`, anything else
/// means "no chip".
fn decode_sid_addr(byte: u8) -> u16 {
    if byte >= 0x42 && (byte <= 0x7F || byte >= 0xE0) && byte & 1 == 0 {
        0xD000 | (u16::from(byte) << 4)
    } else {
        0
    }
}

impl SidHeader {
    /// Parse a header from the start of `bytes`.
    ///
    /// Validates the magic ident and supports versions 1 through 4; the
    /// flags block is zero-defaulted for v1 files.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < V1_HEADER_LEN {
            return Err(ParseError::HeaderTooShort("sid header".into()));
        }

        let ident = read_slice(bytes, 0, 4)?;
        let is_rsid = match ident {
            b"PSID" => false,
            b"RSID" => true,
            _ => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(ident);
                return Err(ParseError::InvalidIdent(raw));
            }
        };

        let version = read_u16_be_at(bytes, 0x04)?;
        if !(1..=4).contains(&version) {
            return Err(ParseError::UnsupportedVersion(version));
        }
        if version >= 2 && bytes.len() < V2_HEADER_LEN {
            return Err(ParseError::HeaderTooShort("sid v2 header".into()));
        }

        let mut header = SidHeader {
            is_rsid,
            version,
            data_offset: read_u16_be_at(bytes, 0x06)?,
            load_address: read_u16_be_at(bytes, 0x08)?,
            init_address: read_u16_be_at(bytes, 0x0A)?,
            play_address: read_u16_be_at(bytes, 0x0C)?,
            songs: read_u16_be_at(bytes, 0x0E)?,
            start_song: read_u16_be_at(bytes, 0x10)?,
            speed: read_u32_be_at(bytes, 0x12)?,
            name: read_latin1(bytes, 0x16, 32)?,
            author: read_latin1(bytes, 0x36, 32)?,
            released: read_latin1(bytes, 0x56, 32)?,
            flags: 0,
            start_page: 0,
            page_length: 0,
            second_sid_address: 0,
            third_sid_address: 0,
            video: VideoStandard::Unknown,
            sid_model: [SidModel::Unknown; 3],
        };

        if version >= 2 {
            header.flags = read_u16_be_at(bytes, 0x76)?;
            header.start_page = read_u8_at(bytes, 0x78)?;
            header.page_length = read_u8_at(bytes, 0x79)?;
            header.video = decode_video(header.flags >> 2);
            header.sid_model = [
                decode_model(header.flags >> 4),
                decode_model(header.flags >> 6),
                decode_model(header.flags >> 8),
            ];
            if version >= 3 {
                header.second_sid_address = decode_sid_addr(read_u8_at(bytes, 0x7A)?);
            }
            if version >= 4 {
                header.third_sid_address = decode_sid_addr(read_u8_at(bytes, 0x7B)?);
            }
        }

        Ok(header)
    }

    /// Playroutine timer source for a 1-based song number. Songs beyond
    /// bit 32 share bit 31, per the bitmask convention.
    pub fn song_speed(&self, song: u16) -> SongSpeed {
        let bit = song.saturating_sub(1).min(31) as u32;
        if self.speed & (1 << bit) != 0 {
            SongSpeed::Cia
        } else {
            SongSpeed::Vbi
        }
    }

    /// Chip clock implied by the declared video standard; PAL is the
    /// default for unknown and dual-standard tunes.
    pub fn chip_clock(&self) -> ChipClock {
        match self.video {
            VideoStandard::Ntsc => ChipClock::Ntsc,
            _ => ChipClock::Pal,
        }
    }

    /// Number of SID chips the tune addresses, 1..=3.
    pub fn num_sids(&self) -> usize {
        1 + [self.second_sid_address, self.third_sid_address]
            .iter()
            .filter(|&&a| a != 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal v2 PSID header for tests.
    fn test_header(flags: u16) -> Vec<u8> {
        let mut bytes = vec![0u8; V2_HEADER_LEN];
        bytes[0..4].copy_from_slice(b"PSID");
        bytes[0x05] = 2; // version
        bytes[0x07] = 0x7C; // data offset
        bytes[0x0F] = 3; // songs
        bytes[0x11] = 1; // start song
        bytes[0x12..0x16].copy_from_slice(&5u32.to_be_bytes()); // speed mask
        bytes[0x16..0x1A].copy_from_slice(b"Test");
        bytes[0x36..0x3C].copy_from_slice(b"Author");
        bytes[0x56..0x5A].copy_from_slice(b"1987");
        bytes[0x76..0x78].copy_from_slice(&flags.to_be_bytes());
        bytes
    }

    #[test]
    fn test_parse_v2_psid() {
        let header = SidHeader::parse(&test_header(0b0001_0100)).unwrap();
        assert!(!header.is_rsid);
        assert_eq!(header.version, 2);
        assert_eq!(header.songs, 3);
        assert_eq!(header.start_song, 1);
        assert_eq!(header.name, "Test");
        assert_eq!(header.author, "Author");
        assert_eq!(header.released, "1987");
        assert_eq!(header.video, VideoStandard::Pal);
        assert_eq!(header.sid_model[0], SidModel::Mos6581);
        assert_eq!(header.num_sids(), 1);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = test_header(0);
        bytes[0..4].copy_from_slice(b"XSID");
        assert!(matches!(
            SidHeader::parse(&bytes),
            Err(ParseError::InvalidIdent(_))
        ));
    }

    #[test]
    fn test_short_header_rejected() {
        assert!(matches!(
            SidHeader::parse(&[0u8; 16]),
            Err(ParseError::HeaderTooShort(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = test_header(0);
        bytes[0x05] = 9;
        assert!(matches!(
            SidHeader::parse(&bytes),
            Err(ParseError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_speed_bitmask_per_song() {
        // speed = 5: songs 1 and 3 use the CIA timer.
        let header = SidHeader::parse(&test_header(0)).unwrap();
        assert_eq!(header.song_speed(1), SongSpeed::Cia);
        assert_eq!(header.song_speed(2), SongSpeed::Vbi);
        assert_eq!(header.song_speed(3), SongSpeed::Cia);
        // Past bit 32 shares the last bit.
        assert_eq!(header.song_speed(60), SongSpeed::Vbi);
    }

    #[test]
    fn test_ntsc_flag_selects_clock() {
        let header = SidHeader::parse(&test_header(0b0000_1000)).unwrap();
        assert_eq!(header.video, VideoStandard::Ntsc);
        assert_eq!(header.chip_clock(), ChipClock::Ntsc);
        let header = SidHeader::parse(&test_header(0b0000_0100)).unwrap();
        assert_eq!(header.chip_clock(), ChipClock::Pal);
    }

    #[test]
    fn test_extra_sid_addresses() {
        let mut bytes = test_header(0);
        bytes[0x05] = 4; // v4
        bytes[0x7A] = 0x42; // $D420
        bytes[0x7B] = 0xE0; // $DE00
        let header = SidHeader::parse(&bytes).unwrap();
        assert_eq!(header.second_sid_address, 0xD420);
        assert_eq!(header.third_sid_address, 0xDE00);
        assert_eq!(header.num_sids(), 3);

        // Odd or out-of-range bytes mean no chip.
        bytes[0x7A] = 0x43;
        let header = SidHeader::parse(&bytes).unwrap();
        assert_eq!(header.second_sid_address, 0);
    }

    #[test]
    fn test_rsid_accepted() {
        let mut bytes = test_header(0);
        bytes[0..4].copy_from_slice(b"RSID");
        let header = SidHeader::parse(&bytes).unwrap();
        assert!(header.is_rsid);
    }
}
