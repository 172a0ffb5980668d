//! Audio/video fragment muxing.
//!
//! Combines a video stream and an audio stream, each delivered as its own
//! init segment plus fragments, into one fragmented MP4:
//!
//! ```text
//! [ftyp from video init]
//! [moov: mvhd, video trak, audio trak (track 2), mvex: video trex, audio trex]
//! [video fragment 0][audio fragment 0][video fragment 1][audio fragment 1]...
//! ```
//!
//! Every fragment's `mfhd` sequence number is renumbered from a shared
//! counter and its `tfdt` decode time is replaced by the running duration of
//! its stream, so both tracks start at zero and stay contiguous.

use crate::boxes::layout::{
    DecodeTime, FragmentHeader, MovieHeader, TrackExtends, TrackFragmentHeader, TrackHeader,
};
use crate::boxes::{
    expand, find_box, find_tree, iter_boxes, serialize_box, write_box, BoxType, Mp4Box,
};
use crate::fragment::{analyze, DurationSource, FragmentInfo};
use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Track ID assigned to the audio track in the muxed file.
pub const AUDIO_TRACK_ID: u32 = 2;

/// Next track ID written into the movie header (two tracks in use).
pub const NEXT_TRACK_ID: u32 = 3;

/// Timescale assumed when a stream has no readable movie header.
pub const DEFAULT_TIMESCALE: u32 = 90_000;

/// Media type of the muxed output.
pub const MIME_TYPE: &str = "video/mp4";

/// Which elementary stream a fragment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buffers for one mux invocation.
///
/// Fragment sequences must be in presentation order and index-aligned:
/// video fragment `i` is paired with audio fragment `i`.
#[derive(Debug, Clone, Copy)]
pub struct MuxInput<'a> {
    pub video_init: &'a Bytes,
    pub audio_init: &'a Bytes,
    pub video_fragments: &'a [Bytes],
    pub audio_fragments: &'a [Bytes],
}

/// What a mux invocation did, for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct MuxSummary {
    /// Number of video/audio fragment pairs written.
    pub fragment_pairs: usize,
    /// Video fragments beyond the audio count, not written.
    pub dropped_video: usize,
    /// Audio fragments beyond the video count, not written.
    pub dropped_audio: usize,
    /// Total video duration in video timescale units.
    pub video_duration: u64,
    /// Total audio duration in audio timescale units.
    pub audio_duration: u64,
    pub video_timescale: u32,
    pub audio_timescale: u32,
}

impl MuxSummary {
    /// Video duration in seconds.
    pub fn video_secs(&self) -> f64 {
        secs(self.video_duration, self.video_timescale)
    }

    /// Audio duration in seconds.
    pub fn audio_secs(&self) -> f64 {
        secs(self.audio_duration, self.audio_timescale)
    }
}

fn secs(duration: u64, timescale: u32) -> f64 {
    if timescale == 0 {
        0.0
    } else {
        duration as f64 / timescale as f64
    }
}

/// A complete muxed file.
#[derive(Debug, Clone)]
pub struct MuxedOutput {
    data: Bytes,
    summary: MuxSummary,
}

impl MuxedOutput {
    /// The muxed bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn summary(&self) -> &MuxSummary {
        &self.summary
    }

    /// Hand the bytes to the consumer.
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// Mux a video and an audio stream into one fragmented MP4.
///
/// Fails without producing output when the init segments lack a box the
/// combined header is built from. Missing timing boxes inside fragments only
/// degrade timing.
pub fn mux(input: MuxInput<'_>) -> Result<MuxedOutput> {
    let (ftyp_offset, ftyp) =
        find_box(input.video_init, BoxType::FTYP).ok_or(Error::MissingRequiredBox("file-type"))?;
    let ftyp_end = ftyp_offset + ftyp.declared_size as usize;

    let header = CombinedHeader::build(input.video_init, input.audio_init)?;
    let moov = serialize_box(&header.moov);
    tracing::debug!(
        "Combined moov is {} bytes (video timescale {}, audio timescale {})",
        moov.len(),
        header.video_timescale,
        header.audio_timescale
    );

    let pairs = input
        .video_fragments
        .len()
        .min(input.audio_fragments.len());
    let dropped_video = input.video_fragments.len() - pairs;
    let dropped_audio = input.audio_fragments.len() - pairs;
    if dropped_video > 0 || dropped_audio > 0 {
        tracing::warn!(
            "Fragment counts differ; dropping {} video and {} audio fragments",
            dropped_video,
            dropped_audio
        );
    }

    let fragment_bytes: usize = input.video_fragments[..pairs]
        .iter()
        .chain(&input.audio_fragments[..pairs])
        .map(Bytes::len)
        .sum();
    let mut out = BytesMut::with_capacity(ftyp.declared_size as usize + moov.len() + fragment_bytes);
    out.put_slice(&input.video_init[ftyp_offset..ftyp_end]);
    out.put_slice(&moov);

    let mut video = StreamClock::new(TrackKind::Video, header.video_timescale);
    let mut audio = StreamClock::new(TrackKind::Audio, header.audio_timescale);
    let mut sequence = 1u32;

    for index in 0..pairs {
        let video_fragment = &input.video_fragments[index];
        let audio_fragment = &input.audio_fragments[index];
        let video_info = analyze(video_fragment);
        let audio_info = analyze(audio_fragment);

        rewrite_fragment(video_fragment, sequence, TrackKind::Video, video.time, &mut out)?;
        video.advance(index, &video_info);
        sequence += 1;

        rewrite_fragment(audio_fragment, sequence, TrackKind::Audio, audio.time, &mut out)?;
        audio.advance(index, &audio_info);
        sequence += 1;
    }

    tracing::info!(
        "Muxed {} fragment pairs into {} bytes",
        pairs,
        out.len()
    );

    Ok(MuxedOutput {
        data: out.freeze(),
        summary: MuxSummary {
            fragment_pairs: pairs,
            dropped_video,
            dropped_audio,
            video_duration: video.time,
            audio_duration: audio.time,
            video_timescale: header.video_timescale,
            audio_timescale: header.audio_timescale,
        },
    })
}

/// The merged `moov` and the per-stream timescales read along the way.
struct CombinedHeader {
    moov: Mp4Box,
    video_timescale: u32,
    audio_timescale: u32,
}

impl CombinedHeader {
    fn build(video_init: &Bytes, audio_init: &Bytes) -> Result<Self> {
        let mut video_moov =
            find_tree(video_init, BoxType::MOOV).ok_or(Error::MissingRequiredBox("movie"))?;
        let mut mvhd = video_moov
            .take_child(BoxType::MVHD)
            .ok_or(Error::MissingRequiredBox("movie-header"))?;
        let video_trak = video_moov
            .take_child(BoxType::TRAK)
            .ok_or(Error::MissingRequiredBox("track"))?;
        let mut video_mvex = video_moov
            .take_child(BoxType::MVEX)
            .ok_or(Error::MissingRequiredBox("movie-extends"))?;

        let mut audio_moov =
            find_tree(audio_init, BoxType::MOOV).ok_or(Error::MissingRequiredBox("movie"))?;
        let mut audio_trak = audio_moov
            .take_child(BoxType::TRAK)
            .ok_or(Error::MissingRequiredBox("track"))?;
        let mut audio_mvex = audio_moov
            .take_child(BoxType::MVEX)
            .ok_or(Error::MissingRequiredBox("movie-extends"))?;

        let tkhd = audio_trak
            .child_mut(BoxType::TKHD)
            .ok_or(Error::MissingRequiredBox("track-header"))?;
        let layout = TrackHeader::of(tkhd)?;
        tkhd.patch_u32(layout.track_id_offset(), AUDIO_TRACK_ID)?;

        let mut audio_trex = audio_mvex
            .take_child(BoxType::TREX)
            .ok_or(Error::MissingRequiredBox("track-extends"))?;
        audio_trex.patch_u32(TrackExtends::TRACK_ID_OFFSET, AUDIO_TRACK_ID)?;

        let video_timescale = timescale(&mvhd);
        let audio_timescale = audio_moov
            .child(BoxType::MVHD)
            .map(timescale)
            .unwrap_or(DEFAULT_TIMESCALE);

        let layout = MovieHeader::of(&mvhd)?;
        mvhd.patch_u32(layout.next_track_id_offset(), NEXT_TRACK_ID)?;

        let video_trex = video_mvex
            .take_child(BoxType::TREX)
            .ok_or(Error::MissingRequiredBox("track-extends"))?;
        let mvex = Mp4Box::container(BoxType::MVEX, vec![video_trex, audio_trex]);

        let moov = Mp4Box::container(BoxType::MOOV, vec![mvhd, video_trak, audio_trak, mvex]);

        Ok(Self {
            moov,
            video_timescale,
            audio_timescale,
        })
    }
}

/// Movie timescale, or [`DEFAULT_TIMESCALE`] if the header is unreadable.
fn timescale(mvhd: &Mp4Box) -> u32 {
    MovieHeader::of(mvhd)
        .ok()
        .and_then(|layout| mvhd.read_u32(layout.timescale_offset()))
        .unwrap_or(DEFAULT_TIMESCALE)
}

/// Running decode time of one stream.
struct StreamClock {
    track: TrackKind,
    timescale: u32,
    time: u64,
}

impl StreamClock {
    fn new(track: TrackKind, timescale: u32) -> Self {
        Self {
            track,
            timescale,
            time: 0,
        }
    }

    fn advance(&mut self, index: usize, info: &FragmentInfo) {
        if info.total_duration == 0 {
            tracing::warn!(
                "Incomplete timing info in {} fragment {} ({:?}, {} samples); estimating duration",
                self.track,
                index,
                info.duration_source,
                info.sample_count
            );
        } else if info.duration_source == DurationSource::Default {
            tracing::trace!(
                "{} fragment {} uses default sample duration",
                self.track,
                index
            );
        }
        self.time += info.duration_or_estimate(self.timescale);
    }
}

/// Append `fragment` to `out` with its `moof` rewritten.
///
/// Boxes other than `moof` are copied byte for byte.
pub fn rewrite_fragment(
    fragment: &Bytes,
    sequence: u32,
    track: TrackKind,
    base_time: u64,
    out: &mut BytesMut,
) -> Result<()> {
    let mut boxes = iter_boxes(fragment);
    let mut saw_moof = false;

    for (offset, b) in boxes.by_ref() {
        if b.box_type == BoxType::MOOF {
            saw_moof = true;
            let mut moof = expand(b);
            rewrite_moof(&mut moof, sequence, track, base_time)?;
            write_box(&moof, out);
        } else {
            out.put_slice(&fragment[offset..offset + b.declared_size as usize]);
        }
    }

    if !saw_moof {
        tracing::warn!("{} fragment {} has no moof; copied as is", track, sequence);
    }
    if boxes.offset() < fragment.len() {
        tracing::warn!(
            "Dropping {} unreadable trailing bytes from {} fragment {}",
            fragment.len() - boxes.offset(),
            track,
            sequence
        );
    }

    Ok(())
}

fn rewrite_moof(moof: &mut Mp4Box, sequence: u32, track: TrackKind, base_time: u64) -> Result<()> {
    match moof.child_mut(BoxType::MFHD) {
        Some(mfhd) => mfhd.patch_u32(FragmentHeader::SEQUENCE_NUMBER_OFFSET, sequence)?,
        None => tracing::warn!("{} fragment {} has no mfhd", track, sequence),
    }

    let Some(traf) = moof.child_mut(BoxType::TRAF) else {
        tracing::warn!("{} fragment {} has no traf", track, sequence);
        return Ok(());
    };

    if track == TrackKind::Audio {
        let tfhd = traf
            .child_mut(BoxType::TFHD)
            .ok_or(Error::MissingRequiredBox("track-fragment-header"))?;
        tfhd.patch_u32(TrackFragmentHeader::TRACK_ID_OFFSET, AUDIO_TRACK_ID)?;
    }

    match traf.child_mut(BoxType::TFDT) {
        Some(tfdt) => match DecodeTime::of(tfdt) {
            Some(layout) => layout.write(tfdt, base_time)?,
            None => tracing::warn!(
                "{} fragment {} has an unsupported tfdt; decode time left as is",
                track,
                sequence
            ),
        },
        None => tracing::warn!("{} fragment {} has no tfdt", track, sequence),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::{parse_tree, read_box};
    use crate::fixtures::{raw_box, FragmentBuilder, InitSegmentBuilder};

    #[test]
    fn test_rewrite_keeps_sibling_boxes() {
        let fragment = FragmentBuilder::new(40, 1)
            .base_media_decode_time(123)
            .build();
        let mut out = BytesMut::new();
        rewrite_fragment(&fragment, 2, TrackKind::Audio, 500, &mut out).unwrap();

        // Same layout, only moof fields changed.
        assert_eq!(out.len(), fragment.len());
        let out = out.freeze();
        let (styp_offset, styp) = find_box(&out, BoxType::STYP).unwrap();
        assert_eq!(styp_offset, 0);
        assert_eq!(
            &out[..styp.declared_size as usize],
            &fragment[..styp.declared_size as usize]
        );
        let (mdat_offset, _) = find_box(&out, BoxType::MDAT).unwrap();
        assert_eq!(&out[mdat_offset..], &fragment[mdat_offset..]);

        let moof = find_tree(&out, BoxType::MOOF).unwrap();
        assert_eq!(moof.child(BoxType::MFHD).unwrap().read_u32(4), Some(2));
        let traf = moof.child(BoxType::TRAF).unwrap();
        assert_eq!(traf.child(BoxType::TFHD).unwrap().read_u32(4), Some(AUDIO_TRACK_ID));
        assert_eq!(analyze(&out).base_decode_time, 500);
    }

    #[test]
    fn test_rewrite_video_keeps_track_id() {
        let fragment = FragmentBuilder::new(1, 1).build();
        let mut out = BytesMut::new();
        rewrite_fragment(&fragment, 1, TrackKind::Video, 0, &mut out).unwrap();

        let moof = find_tree(&out.freeze(), BoxType::MOOF).unwrap();
        let tfhd = moof.child(BoxType::TRAF).unwrap().child(BoxType::TFHD).unwrap();
        assert_eq!(tfhd.read_u32(4), Some(1));
    }

    #[test]
    fn test_rewrite_audio_without_tfhd_fails() {
        let fragment = FragmentBuilder::new(1, 1).without_tfhd().build();
        let mut out = BytesMut::new();
        let err = rewrite_fragment(&fragment, 1, TrackKind::Audio, 0, &mut out).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingRequiredBox("track-fragment-header")
        ));
    }

    #[test]
    fn test_rewrite_without_tfdt_or_mfhd_still_succeeds() {
        let fragment = FragmentBuilder::new(9, 1)
            .without_tfdt()
            .without_mfhd()
            .build();
        let mut out = BytesMut::new();
        rewrite_fragment(&fragment, 1, TrackKind::Video, 1000, &mut out).unwrap();
        assert_eq!(out.as_ref(), fragment.as_ref());
    }

    #[test]
    fn test_rewrite_drops_trailing_garbage() {
        let mut data = FragmentBuilder::new(1, 1).without_styp().build().to_vec();
        let clean_len = data.len();
        data.extend_from_slice(&[0, 0, 0]);
        let mut out = BytesMut::new();
        rewrite_fragment(&Bytes::from(data), 1, TrackKind::Video, 0, &mut out).unwrap();
        assert_eq!(out.len(), clean_len);
    }

    #[test]
    fn test_combined_header_layout() {
        let video_init = InitSegmentBuilder::video().build();
        let audio_init = InitSegmentBuilder::audio().with_mehd().build();
        let header = CombinedHeader::build(&video_init, &audio_init).unwrap();

        let bytes = serialize_box(&header.moov);
        let moov = parse_tree(&bytes, 0).unwrap();
        let types: Vec<_> = moov.children().iter().map(|c| c.box_type).collect();
        assert_eq!(
            types,
            vec![BoxType::MVHD, BoxType::TRAK, BoxType::TRAK, BoxType::MVEX]
        );

        let mvex = moov.child(BoxType::MVEX).unwrap();
        let trex_ids: Vec<_> = mvex
            .children()
            .iter()
            .map(|trex| {
                assert_eq!(trex.box_type, BoxType::TREX);
                trex.read_u32(4).unwrap()
            })
            .collect();
        assert_eq!(trex_ids, vec![1, 2]);
        assert_eq!(header.video_timescale, 90_000);
        assert_eq!(header.audio_timescale, 48_000);
    }

    #[test]
    fn test_audio_timescale_defaults_without_mvhd() {
        let video_init = InitSegmentBuilder::video().build();
        let audio_init = InitSegmentBuilder::audio().without_mvhd().build();
        let header = CombinedHeader::build(&video_init, &audio_init).unwrap();
        assert_eq!(header.audio_timescale, DEFAULT_TIMESCALE);
    }

    #[test]
    fn test_missing_boxes_are_named() {
        let audio_init = InitSegmentBuilder::audio().build();
        let cases = [
            (InitSegmentBuilder::video().without_mvhd(), "movie-header"),
            (InitSegmentBuilder::video().without_mvex(), "movie-extends"),
            (InitSegmentBuilder::video().without_trex(), "track-extends"),
        ];
        for (builder, name) in cases {
            let video_init = builder.build();
            match CombinedHeader::build(&video_init, &audio_init) {
                Err(Error::MissingRequiredBox(missing)) => assert_eq!(missing, name),
                other => panic!("expected missing {}, got {:?}", name, other.map(|_| ())),
            }
        }

        let video_init = InitSegmentBuilder::video().build();
        let no_tkhd = InitSegmentBuilder::audio().without_tkhd().build();
        assert!(matches!(
            CombinedHeader::build(&video_init, &no_tkhd),
            Err(Error::MissingRequiredBox("track-header"))
        ));

        let no_moov = Bytes::from(raw_box(b"ftyp", b"iso6\0\0\0\0"));
        assert!(matches!(
            CombinedHeader::build(&video_init, &no_moov),
            Err(Error::MissingRequiredBox("movie"))
        ));
    }

    #[test]
    fn test_mux_without_ftyp_fails() {
        let video_init = InitSegmentBuilder::video().without_ftyp().build();
        let audio_init = InitSegmentBuilder::audio().build();
        let result = mux(MuxInput {
            video_init: &video_init,
            audio_init: &audio_init,
            video_fragments: &[],
            audio_fragments: &[],
        });
        assert!(matches!(result, Err(Error::MissingRequiredBox("file-type"))));
    }

    #[test]
    fn test_mux_with_no_fragments_is_header_only() {
        let video_init = InitSegmentBuilder::video().build();
        let audio_init = InitSegmentBuilder::audio().build();
        let output = mux(MuxInput {
            video_init: &video_init,
            audio_init: &audio_init,
            video_fragments: &[],
            audio_fragments: &[],
        })
        .unwrap();

        let data = output.into_bytes();
        let ftyp = read_box(&data, 0).unwrap();
        let moov = read_box(&data, ftyp.declared_size as usize).unwrap();
        assert_eq!(moov.box_type, BoxType::MOOV);
        assert_eq!(
            data.len() as u64,
            ftyp.declared_size + moov.declared_size
        );
    }

    #[test]
    fn test_summary_seconds() {
        let summary = MuxSummary {
            video_duration: 180_000,
            video_timescale: 90_000,
            audio_duration: 0,
            audio_timescale: 0,
            ..Default::default()
        };
        assert!((summary.video_secs() - 2.0).abs() < 1e-9);
        assert_eq!(summary.audio_secs(), 0.0);
    }
}
