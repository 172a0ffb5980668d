//! Field layouts of the full boxes the muxer reads and rewrites.
//!
//! Several boxes move their fields around depending on the version byte. Each
//! such box gets an enum with one variant per version, and every offset is
//! looked up through it. Offsets are relative to the payload start, so they
//! include the 4-byte version/flags word.

use super::Mp4Box;
use crate::{Error, Result};

/// Movie header (`mvhd`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovieHeader {
    /// 32-bit creation/modification times and duration.
    V0,
    /// 64-bit creation/modification times and duration.
    V1,
}

impl MovieHeader {
    /// Determine the layout from the version byte; any non-zero version uses
    /// the 64-bit layout.
    pub fn of(mvhd: &Mp4Box) -> Result<Self> {
        match mvhd.version() {
            Some(0) => Ok(Self::V0),
            Some(_) => Ok(Self::V1),
            None => Err(Error::malformed(0, "mvhd payload is empty")),
        }
    }

    pub const fn timescale_offset(self) -> usize {
        match self {
            Self::V0 => 12,
            Self::V1 => 20,
        }
    }

    pub const fn next_track_id_offset(self) -> usize {
        match self {
            Self::V0 => 96,
            Self::V1 => 108,
        }
    }
}

/// Track header (`tkhd`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackHeader {
    V0,
    V1,
}

impl TrackHeader {
    /// Determine the layout from the version byte; any non-zero version uses
    /// the 64-bit layout.
    pub fn of(tkhd: &Mp4Box) -> Result<Self> {
        match tkhd.version() {
            Some(0) => Ok(Self::V0),
            Some(_) => Ok(Self::V1),
            None => Err(Error::malformed(0, "tkhd payload is empty")),
        }
    }

    pub const fn track_id_offset(self) -> usize {
        match self {
            Self::V0 => 12,
            Self::V1 => 20,
        }
    }
}

/// Track fragment decode time (`tfdt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeTime {
    /// 32-bit time at offset 4.
    V0,
    /// 64-bit time stored as high word at 4, low word at 8.
    V1,
}

impl DecodeTime {
    /// Determine the layout; `None` for an empty payload or an unknown version.
    pub fn of(tfdt: &Mp4Box) -> Option<Self> {
        match tfdt.version()? {
            0 => Some(Self::V0),
            1 => Some(Self::V1),
            _ => None,
        }
    }

    /// Read the base media decode time.
    pub fn read(self, tfdt: &Mp4Box) -> Option<u64> {
        match self {
            Self::V0 => tfdt.read_u32(4).map(u64::from),
            Self::V1 => {
                let high = tfdt.read_u32(4)?;
                let low = tfdt.read_u32(8)?;
                Some((u64::from(high) << 32) | u64::from(low))
            }
        }
    }

    /// Overwrite the base media decode time.
    ///
    /// A version 0 box only holds 32 bits; larger times are truncated.
    pub fn write(self, tfdt: &mut Mp4Box, time: u64) -> Result<()> {
        match self {
            Self::V0 => {
                if time > u64::from(u32::MAX) {
                    tracing::warn!(
                        "Decode time {} does not fit a version 0 tfdt; truncating",
                        time
                    );
                }
                tfdt.patch_u32(4, time as u32)
            }
            Self::V1 => {
                tfdt.patch_u32(4, (time >> 32) as u32)?;
                tfdt.patch_u32(8, (time & 0xFFFF_FFFF) as u32)
            }
        }
    }
}

/// Track extends (`trex`).
pub struct TrackExtends;

impl TrackExtends {
    pub const TRACK_ID_OFFSET: usize = 4;
}

/// Movie fragment header (`mfhd`).
pub struct FragmentHeader;

impl FragmentHeader {
    pub const SEQUENCE_NUMBER_OFFSET: usize = 4;
}

/// Track fragment header (`tfhd`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackFragmentHeader {
    pub flags: u32,
}

impl TrackFragmentHeader {
    pub const TRACK_ID_OFFSET: usize = 4;

    pub const BASE_DATA_OFFSET_PRESENT: u32 = 0x000001;
    pub const SAMPLE_DESCRIPTION_INDEX_PRESENT: u32 = 0x000002;
    pub const DEFAULT_SAMPLE_DURATION_PRESENT: u32 = 0x000008;

    pub fn of(tfhd: &Mp4Box) -> Option<Self> {
        tfhd.flags().map(|flags| Self { flags })
    }

    /// Offset of the default sample duration, when the flags say it is present.
    pub fn default_sample_duration_offset(self) -> Option<usize> {
        if self.flags & Self::DEFAULT_SAMPLE_DURATION_PRESENT == 0 {
            return None;
        }
        let mut offset = 8;
        if self.flags & Self::BASE_DATA_OFFSET_PRESENT != 0 {
            offset += 8;
        }
        if self.flags & Self::SAMPLE_DESCRIPTION_INDEX_PRESENT != 0 {
            offset += 4;
        }
        Some(offset)
    }
}

/// Track run (`trun`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackRun {
    pub flags: u32,
}

impl TrackRun {
    pub const SAMPLE_COUNT_OFFSET: usize = 4;

    pub const DATA_OFFSET_PRESENT: u32 = 0x000001;
    pub const FIRST_SAMPLE_FLAGS_PRESENT: u32 = 0x000004;
    pub const SAMPLE_DURATION_PRESENT: u32 = 0x000100;
    pub const SAMPLE_SIZE_PRESENT: u32 = 0x000200;
    pub const SAMPLE_FLAGS_PRESENT: u32 = 0x000400;
    pub const SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT: u32 = 0x000800;

    pub fn of(trun: &Mp4Box) -> Option<Self> {
        trun.flags().map(|flags| Self { flags })
    }

    pub fn has_sample_durations(self) -> bool {
        self.flags & Self::SAMPLE_DURATION_PRESENT != 0
    }

    /// Offset of the first per-sample record.
    pub fn first_record_offset(self) -> usize {
        let mut offset = 8;
        if self.flags & Self::DATA_OFFSET_PRESENT != 0 {
            offset += 4;
        }
        if self.flags & Self::FIRST_SAMPLE_FLAGS_PRESENT != 0 {
            offset += 4;
        }
        offset
    }

    /// Size of one per-sample record.
    pub fn record_stride(self) -> usize {
        [
            Self::SAMPLE_DURATION_PRESENT,
            Self::SAMPLE_SIZE_PRESENT,
            Self::SAMPLE_FLAGS_PRESENT,
            Self::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT,
        ]
        .iter()
        .filter(|&&bit| self.flags & bit != 0)
        .count()
            * 4
    }
}
