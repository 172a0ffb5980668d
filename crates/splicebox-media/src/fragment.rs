//! Per-fragment timing analysis.
//!
//! A fragment is a `moof` + `mdat` pair (optionally preceded by `styp`). The
//! analyzer reads the first track fragment's decode time, sample count and the
//! total sample duration, either from explicit per-sample durations in the
//! `trun` or from the `tfhd` default sample duration.

use crate::boxes::layout::{DecodeTime, TrackFragmentHeader, TrackRun};
use crate::boxes::{find_tree, read_u32, BoxType, Mp4Box};
use bytes::Bytes;

/// Where a fragment's total duration came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
pub enum DurationSource {
    /// Summed from per-sample durations in the track run.
    Explicit,
    /// Default sample duration from the track fragment header times sample count.
    Default,
    /// No duration information was found.
    #[default]
    Missing,
}

/// Timing information for one fragment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct FragmentInfo {
    /// Base media decode time from `tfdt`.
    pub base_decode_time: u64,
    /// Number of samples in the track run.
    pub sample_count: u32,
    /// Sum of sample durations in track timescale units.
    pub total_duration: u32,
    /// Origin of `total_duration`.
    pub duration_source: DurationSource,
}

impl FragmentInfo {
    /// Duration to advance the running decode time by.
    ///
    /// Falls back to [`estimate_duration`] when the fragment carried no usable
    /// duration.
    pub fn duration_or_estimate(&self, timescale: u32) -> u64 {
        if self.total_duration > 0 {
            u64::from(self.total_duration)
        } else {
            estimate_duration(self.sample_count, timescale)
        }
    }
}

/// Analyze a fragment buffer.
///
/// A fragment without `moof` or `traf` yields a zeroed [`FragmentInfo`].
pub fn analyze(fragment: &Bytes) -> FragmentInfo {
    match find_tree(fragment, BoxType::MOOF) {
        Some(moof) => analyze_moof(&moof),
        None => FragmentInfo::default(),
    }
}

/// Analyze an already parsed `moof` box.
pub fn analyze_moof(moof: &Mp4Box) -> FragmentInfo {
    let mut info = FragmentInfo::default();
    let Some(traf) = moof.child(BoxType::TRAF) else {
        return info;
    };

    if let Some(tfdt) = traf.child(BoxType::TFDT) {
        if let Some(time) = DecodeTime::of(tfdt).and_then(|layout| layout.read(tfdt)) {
            info.base_decode_time = time;
        }
    }

    let Some(trun) = traf.child(BoxType::TRUN) else {
        return info;
    };
    let (Some(layout), Some(payload)) = (TrackRun::of(trun), trun.payload()) else {
        return info;
    };
    info.sample_count = read_u32(payload, TrackRun::SAMPLE_COUNT_OFFSET).unwrap_or(0);

    if layout.has_sample_durations() {
        let total = sum_sample_durations(payload, layout, info.sample_count);
        info.total_duration = saturate(total);
        info.duration_source = DurationSource::Explicit;
    } else if let Some(default) = traf.child(BoxType::TFHD).and_then(default_sample_duration) {
        let total = u64::from(default) * u64::from(info.sample_count);
        info.total_duration = saturate(total);
        info.duration_source = DurationSource::Default;
    }

    info
}

fn sum_sample_durations(payload: &[u8], layout: TrackRun, sample_count: u32) -> u64 {
    let stride = layout.record_stride();
    let mut offset = layout.first_record_offset();
    let mut total = 0u64;

    for index in 0..sample_count {
        let Some(duration) = read_u32(payload, offset) else {
            tracing::warn!(
                "trun ends after {} of {} sample records; duration is partial",
                index,
                sample_count
            );
            break;
        };
        total += u64::from(duration);
        offset += stride;
    }

    total
}

fn default_sample_duration(tfhd: &Mp4Box) -> Option<u32> {
    let offset = TrackFragmentHeader::of(tfhd)?.default_sample_duration_offset()?;
    tfhd.read_u32(offset)
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Rough duration for a fragment that carries no duration information.
///
/// This is a last-resort heuristic, not a rate detector: timescales of 10000
/// and above are assumed to be video at 30 frames per second, anything lower
/// is assumed to be audio and counted as one tick per sample.
pub fn estimate_duration(sample_count: u32, timescale: u32) -> u64 {
    if sample_count == 0 {
        return 0;
    }
    if timescale >= 10_000 {
        (f64::from(timescale) / 30.0 * f64::from(sample_count)).round() as u64
    } else {
        u64::from(sample_count)
    }
}
