//! Builders for synthetic fMP4 init segments and fragments.
//!
//! Only compiled for tests or with the `fixtures` feature. The output mirrors
//! what a DASH/HLS packager emits per stream: `ftyp` + `moov` for the init
//! segment and `styp` + `moof` + `mdat` for each fragment.

use crate::boxes::layout::{TrackFragmentHeader, TrackRun};
use bytes::{BufMut, Bytes, BytesMut};

/// Serialize a leaf box with a 32-bit size.
pub fn raw_box(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&((8 + payload.len()) as u32).to_be_bytes());
    out.extend_from_slice(box_type);
    out.extend_from_slice(payload);
    out
}

/// Write a box whose content is produced by `body`, fixing up the size after.
fn nest(buf: &mut BytesMut, box_type: &[u8; 4], body: impl FnOnce(&mut BytesMut)) {
    let start = buf.len();
    buf.put_u32(0); // placeholder
    buf.put_slice(box_type);
    body(buf);
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

/// Handler of the single track in an init segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Video,
    Audio,
}

/// Builder for single-track init segments.
#[derive(Debug, Clone)]
pub struct InitSegmentBuilder {
    handler: Handler,
    track_id: u32,
    timescale: u32,
    mvhd_version: u8,
    tkhd_version: u8,
    ftyp: bool,
    mvhd: bool,
    tkhd: bool,
    mvex: bool,
    trex: bool,
    mehd: bool,
}

impl InitSegmentBuilder {
    /// Video init segment, track 1, timescale 90000.
    pub fn video() -> Self {
        Self {
            handler: Handler::Video,
            track_id: 1,
            timescale: 90_000,
            mvhd_version: 0,
            tkhd_version: 0,
            ftyp: true,
            mvhd: true,
            tkhd: true,
            mvex: true,
            trex: true,
            mehd: false,
        }
    }

    /// Audio init segment, track 1, timescale 48000.
    pub fn audio() -> Self {
        Self {
            handler: Handler::Audio,
            timescale: 48_000,
            ..Self::video()
        }
    }

    pub fn track_id(mut self, id: u32) -> Self {
        self.track_id = id;
        self
    }

    pub fn timescale(mut self, ts: u32) -> Self {
        self.timescale = ts;
        self
    }

    pub fn mvhd_version(mut self, version: u8) -> Self {
        self.mvhd_version = version;
        self
    }

    pub fn tkhd_version(mut self, version: u8) -> Self {
        self.tkhd_version = version;
        self
    }

    pub fn without_ftyp(mut self) -> Self {
        self.ftyp = false;
        self
    }

    pub fn without_mvhd(mut self) -> Self {
        self.mvhd = false;
        self
    }

    pub fn without_tkhd(mut self) -> Self {
        self.tkhd = false;
        self
    }

    pub fn without_mvex(mut self) -> Self {
        self.mvex = false;
        self
    }

    pub fn without_trex(mut self) -> Self {
        self.trex = false;
        self
    }

    /// Add a movie extends header (`mehd`) before the `trex`.
    pub fn with_mehd(mut self) -> Self {
        self.mehd = true;
        self
    }

    pub fn build(self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1024);
        if self.ftyp {
            self.write_ftyp(&mut buf);
        }
        nest(&mut buf, b"moov", |buf| {
            if self.mvhd {
                self.write_mvhd(buf);
            }
            self.write_trak(buf);
            if self.mvex {
                self.write_mvex(buf);
            }
        });
        buf.freeze()
    }

    fn write_ftyp(&self, buf: &mut BytesMut) {
        nest(buf, b"ftyp", |buf| {
            buf.put_slice(b"iso6");
            buf.put_u32(0x200); // minor version
            for brand in [b"iso6", b"cmfc", b"mp41"] {
                buf.put_slice(brand);
            }
        });
    }

    fn write_mvhd(&self, buf: &mut BytesMut) {
        nest(buf, b"mvhd", |buf| {
            buf.put_u8(self.mvhd_version);
            buf.put_slice(&[0, 0, 0]); // flags
            if self.mvhd_version == 0 {
                buf.put_u32(0); // creation time
                buf.put_u32(0); // modification time
                buf.put_u32(self.timescale);
                buf.put_u32(0); // duration
            } else {
                buf.put_u64(0);
                buf.put_u64(0);
                buf.put_u32(self.timescale);
                buf.put_u64(0);
            }
            buf.put_u32(0x00010000); // rate = 1.0
            buf.put_u16(0x0100); // volume = 1.0
            buf.put_u16(0); // reserved
            buf.put_u64(0); // reserved
            write_matrix(buf);
            for _ in 0..6 {
                buf.put_u32(0); // pre-defined
            }
            buf.put_u32(self.track_id + 1); // next track ID
        });
    }

    fn write_trak(&self, buf: &mut BytesMut) {
        nest(buf, b"trak", |buf| {
            if self.tkhd {
                self.write_tkhd(buf);
            }
            nest(buf, b"mdia", |buf| {
                self.write_mdhd(buf);
                self.write_hdlr(buf);
                self.write_minf(buf);
            });
        });
    }

    fn write_tkhd(&self, buf: &mut BytesMut) {
        nest(buf, b"tkhd", |buf| {
            buf.put_u8(self.tkhd_version);
            buf.put_slice(&[0, 0, 3]); // enabled | in movie
            if self.tkhd_version == 0 {
                buf.put_u32(0);
                buf.put_u32(0);
                buf.put_u32(self.track_id);
                buf.put_u32(0); // reserved
                buf.put_u32(0); // duration
            } else {
                buf.put_u64(0);
                buf.put_u64(0);
                buf.put_u32(self.track_id);
                buf.put_u32(0);
                buf.put_u64(0);
            }
            buf.put_u64(0); // reserved
            buf.put_u16(0); // layer
            buf.put_u16(0); // alternate group
            match self.handler {
                Handler::Audio => buf.put_u16(0x0100),
                Handler::Video => buf.put_u16(0),
            }
            buf.put_u16(0); // reserved
            write_matrix(buf);
            match self.handler {
                Handler::Video => {
                    buf.put_u32(1280 << 16);
                    buf.put_u32(720 << 16);
                }
                Handler::Audio => {
                    buf.put_u32(0);
                    buf.put_u32(0);
                }
            }
        });
    }

    fn write_mdhd(&self, buf: &mut BytesMut) {
        nest(buf, b"mdhd", |buf| {
            buf.put_u32(0); // version/flags
            buf.put_u32(0);
            buf.put_u32(0);
            buf.put_u32(self.timescale);
            buf.put_u32(0); // duration
            buf.put_u16(0x55C4); // language: und
            buf.put_u16(0);
        });
    }

    fn write_hdlr(&self, buf: &mut BytesMut) {
        let (handler, name): (&[u8; 4], &[u8]) = match self.handler {
            Handler::Video => (b"vide", b"VideoHandler\0"),
            Handler::Audio => (b"soun", b"SoundHandler\0"),
        };
        nest(buf, b"hdlr", |buf| {
            buf.put_u32(0); // version/flags
            buf.put_u32(0); // pre-defined
            buf.put_slice(handler);
            buf.put_slice(&[0; 12]); // reserved
            buf.put_slice(name);
        });
    }

    fn write_minf(&self, buf: &mut BytesMut) {
        nest(buf, b"minf", |buf| {
            match self.handler {
                Handler::Video => nest(buf, b"vmhd", |buf| {
                    buf.put_u32(1); // version 0, flags 1
                    buf.put_slice(&[0; 8]);
                }),
                Handler::Audio => nest(buf, b"smhd", |buf| {
                    buf.put_u32(0);
                    buf.put_u32(0);
                }),
            }
            nest(buf, b"dinf", |buf| {
                nest(buf, b"dref", |buf| {
                    buf.put_u32(0);
                    buf.put_u32(1); // entry count
                    nest(buf, b"url ", |buf| buf.put_u32(1)); // self-contained
                });
            });
            nest(buf, b"stbl", |buf| {
                self.write_stsd(buf);
                for table in [b"stts", b"stsc", b"stco"] {
                    nest(buf, table, |buf| {
                        buf.put_u32(0);
                        buf.put_u32(0);
                    });
                }
                nest(buf, b"stsz", |buf| {
                    buf.put_u32(0);
                    buf.put_u32(0);
                    buf.put_u32(0);
                });
            });
        });
    }

    fn write_stsd(&self, buf: &mut BytesMut) {
        nest(buf, b"stsd", |buf| {
            buf.put_u32(0); // version/flags
            buf.put_u32(1); // entry count
            match self.handler {
                Handler::Video => nest(buf, b"avc1", |buf| {
                    buf.put_slice(&[0; 6]);
                    buf.put_u16(1); // data reference index
                    buf.put_slice(&[0; 16]);
                    buf.put_u16(1280);
                    buf.put_u16(720);
                    buf.put_u32(0x00480000);
                    buf.put_u32(0x00480000);
                    buf.put_u32(0);
                    buf.put_u16(1); // frame count
                    buf.put_slice(&[0; 32]);
                    buf.put_u16(0x0018);
                    buf.put_i16(-1);
                }),
                Handler::Audio => nest(buf, b"mp4a", |buf| {
                    buf.put_slice(&[0; 6]);
                    buf.put_u16(1);
                    buf.put_u64(0);
                    buf.put_u16(2); // channels
                    buf.put_u16(16); // sample size
                    buf.put_u32(0);
                    buf.put_u32(self.timescale << 16);
                }),
            }
        });
    }

    fn write_mvex(&self, buf: &mut BytesMut) {
        nest(buf, b"mvex", |buf| {
            if self.mehd {
                nest(buf, b"mehd", |buf| {
                    buf.put_u32(0);
                    buf.put_u32(0); // fragment duration
                });
            }
            if self.trex {
                nest(buf, b"trex", |buf| {
                    buf.put_u32(0); // version/flags
                    buf.put_u32(self.track_id);
                    buf.put_u32(1); // default sample description index
                    buf.put_u32(0); // default sample duration
                    buf.put_u32(0); // default sample size
                    buf.put_u32(0); // default sample flags
                });
            }
        });
    }
}

fn write_matrix(buf: &mut BytesMut) {
    for value in [0x00010000u32, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000] {
        buf.put_u32(value);
    }
}

#[derive(Debug, Clone)]
enum Durations {
    Explicit(Vec<u32>),
    Default { duration: u32, count: u32 },
    CountOnly(u32),
}

impl Durations {
    fn sample_count(&self) -> u32 {
        match self {
            Self::Explicit(durations) => durations.len() as u32,
            Self::Default { count, .. } | Self::CountOnly(count) => *count,
        }
    }
}

/// Size of every synthetic sample in the `mdat`.
const SAMPLE_SIZE: u32 = 16;

/// Builder for single-track fragments.
#[derive(Debug, Clone)]
pub struct FragmentBuilder {
    sequence_number: u32,
    track_id: u32,
    base_media_decode_time: u64,
    tfdt_version: u8,
    durations: Durations,
    base_data_offset: Option<u64>,
    sample_description_index: Option<u32>,
    first_sample_flags: bool,
    sample_flags: bool,
    composition_offsets: bool,
    styp: bool,
    tfdt: bool,
    tfhd: bool,
    mfhd: bool,
}

impl FragmentBuilder {
    /// Create a fragment with one 1000-tick sample and a version 1 `tfdt`.
    pub fn new(sequence_number: u32, track_id: u32) -> Self {
        Self {
            sequence_number,
            track_id,
            base_media_decode_time: 0,
            tfdt_version: 1,
            durations: Durations::Explicit(vec![1000]),
            base_data_offset: None,
            sample_description_index: None,
            first_sample_flags: false,
            sample_flags: false,
            composition_offsets: false,
            styp: true,
            tfdt: true,
            tfhd: true,
            mfhd: true,
        }
    }

    pub fn base_media_decode_time(mut self, time: u64) -> Self {
        self.base_media_decode_time = time;
        self
    }

    pub fn tfdt_version(mut self, version: u8) -> Self {
        self.tfdt_version = version;
        self
    }

    /// Per-sample durations written into the `trun`.
    pub fn sample_durations(mut self, durations: Vec<u32>) -> Self {
        self.durations = Durations::Explicit(durations);
        self
    }

    /// Default duration in the `tfhd`, with `count` samples in the `trun`.
    pub fn default_sample_duration(mut self, duration: u32, count: u32) -> Self {
        self.durations = Durations::Default { duration, count };
        self
    }

    /// `count` samples and no duration information at all.
    pub fn sample_count_only(mut self, count: u32) -> Self {
        self.durations = Durations::CountOnly(count);
        self
    }

    pub fn base_data_offset(mut self, offset: Option<u64>) -> Self {
        self.base_data_offset = offset;
        self
    }

    pub fn sample_description_index(mut self, index: Option<u32>) -> Self {
        self.sample_description_index = index;
        self
    }

    pub fn first_sample_flags(mut self, present: bool) -> Self {
        self.first_sample_flags = present;
        self
    }

    pub fn sample_flags(mut self, present: bool) -> Self {
        self.sample_flags = present;
        self
    }

    pub fn composition_offsets(mut self, present: bool) -> Self {
        self.composition_offsets = present;
        self
    }

    pub fn without_styp(mut self) -> Self {
        self.styp = false;
        self
    }

    pub fn without_tfdt(mut self) -> Self {
        self.tfdt = false;
        self
    }

    pub fn without_tfhd(mut self) -> Self {
        self.tfhd = false;
        self
    }

    pub fn without_mfhd(mut self) -> Self {
        self.mfhd = false;
        self
    }

    /// Build `styp` (optional) + `moof` + `mdat`.
    ///
    /// Every mdat byte is the low byte of the sequence number so tests can
    /// tell fragments apart after muxing.
    pub fn build(self) -> Bytes {
        let sample_count = self.durations.sample_count();
        let mut buf = BytesMut::with_capacity(256 + (sample_count * SAMPLE_SIZE) as usize);

        if self.styp {
            nest(&mut buf, b"styp", |buf| {
                buf.put_slice(b"msdh");
                buf.put_u32(0);
                buf.put_slice(b"msdh");
                buf.put_slice(b"msix");
            });
        }

        let moof_start = buf.len();
        let mut data_offset_pos = None;
        nest(&mut buf, b"moof", |buf| {
            if self.mfhd {
                nest(buf, b"mfhd", |buf| {
                    buf.put_u32(0); // version/flags
                    buf.put_u32(self.sequence_number);
                });
            }
            nest(buf, b"traf", |buf| {
                if self.tfhd {
                    self.write_tfhd(buf);
                }
                if self.tfdt {
                    self.write_tfdt(buf);
                }
                data_offset_pos = Some(self.write_trun(buf));
            });
        });

        // With default-base-is-moof the data offset is relative to the moof
        // start and points just past the 8-byte mdat header.
        if let Some(pos) = data_offset_pos {
            let data_offset = (buf.len() - moof_start + 8) as u32;
            buf[pos..pos + 4].copy_from_slice(&data_offset.to_be_bytes());
        }

        let fill = self.sequence_number as u8;
        nest(&mut buf, b"mdat", |buf| {
            buf.put_bytes(fill, (sample_count * SAMPLE_SIZE) as usize);
        });

        buf.freeze()
    }

    fn write_tfhd(&self, buf: &mut BytesMut) {
        let mut flags = 0x020000; // default-base-is-moof
        if self.base_data_offset.is_some() {
            flags |= TrackFragmentHeader::BASE_DATA_OFFSET_PRESENT;
        }
        if self.sample_description_index.is_some() {
            flags |= TrackFragmentHeader::SAMPLE_DESCRIPTION_INDEX_PRESENT;
        }
        if matches!(self.durations, Durations::Default { .. }) {
            flags |= TrackFragmentHeader::DEFAULT_SAMPLE_DURATION_PRESENT;
        }

        nest(buf, b"tfhd", |buf| {
            buf.put_u32(flags); // version 0
            buf.put_u32(self.track_id);
            if let Some(offset) = self.base_data_offset {
                buf.put_u64(offset);
            }
            if let Some(index) = self.sample_description_index {
                buf.put_u32(index);
            }
            if let Durations::Default { duration, .. } = self.durations {
                buf.put_u32(duration);
            }
        });
    }

    fn write_tfdt(&self, buf: &mut BytesMut) {
        nest(buf, b"tfdt", |buf| {
            if self.tfdt_version == 1 {
                buf.put_u32(0x01000000);
                buf.put_u64(self.base_media_decode_time);
            } else {
                buf.put_u32(0);
                buf.put_u32(self.base_media_decode_time as u32);
            }
        });
    }

    /// Write the `trun` and return the position of its data offset field.
    fn write_trun(&self, buf: &mut BytesMut) -> usize {
        let mut flags = TrackRun::DATA_OFFSET_PRESENT | TrackRun::SAMPLE_SIZE_PRESENT;
        if matches!(self.durations, Durations::Explicit(_)) {
            flags |= TrackRun::SAMPLE_DURATION_PRESENT;
        }
        if self.first_sample_flags {
            flags |= TrackRun::FIRST_SAMPLE_FLAGS_PRESENT;
        }
        if self.sample_flags {
            flags |= TrackRun::SAMPLE_FLAGS_PRESENT;
        }
        if self.composition_offsets {
            flags |= TrackRun::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT;
        }

        let mut data_offset_pos = 0;
        nest(buf, b"trun", |buf| {
            buf.put_u32(flags); // version 0
            buf.put_u32(self.durations.sample_count());
            data_offset_pos = buf.len();
            buf.put_u32(0); // placeholder
            if self.first_sample_flags {
                buf.put_u32(0x02000000);
            }
            for index in 0..self.durations.sample_count() {
                if let Durations::Explicit(durations) = &self.durations {
                    buf.put_u32(durations[index as usize]);
                }
                buf.put_u32(SAMPLE_SIZE);
                if self.sample_flags {
                    buf.put_u32(0x01010000);
                }
                if self.composition_offsets {
                    buf.put_u32(0);
                }
            }
        });
        data_offset_pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::{find_box, find_tree, BoxType};

    #[test]
    fn test_init_segment_layout() {
        let init = InitSegmentBuilder::video().build();
        assert_eq!(&init[4..8], b"ftyp");

        let moov = find_tree(&init, BoxType::MOOV).unwrap();
        let types: Vec<_> = moov.children().iter().map(|c| c.box_type).collect();
        assert_eq!(types, vec![BoxType::MVHD, BoxType::TRAK, BoxType::MVEX]);

        let mvhd = moov.child(BoxType::MVHD).unwrap();
        assert_eq!(mvhd.payload().unwrap().len(), 100);
        assert_eq!(mvhd.read_u32(12), Some(90_000));
        assert_eq!(mvhd.read_u32(96), Some(2));

        let tkhd = moov.child(BoxType::TRAK).unwrap().child(BoxType::TKHD).unwrap();
        assert_eq!(tkhd.payload().unwrap().len(), 84);
        assert_eq!(tkhd.read_u32(12), Some(1));
    }

    #[test]
    fn test_version_1_headers() {
        let init = InitSegmentBuilder::audio()
            .mvhd_version(1)
            .tkhd_version(1)
            .track_id(5)
            .build();
        let moov = find_tree(&init, BoxType::MOOV).unwrap();

        let mvhd = moov.child(BoxType::MVHD).unwrap();
        assert_eq!(mvhd.payload().unwrap().len(), 112);
        assert_eq!(mvhd.read_u32(20), Some(48_000));
        assert_eq!(mvhd.read_u32(108), Some(6));

        let tkhd = moov.child(BoxType::TRAK).unwrap().child(BoxType::TKHD).unwrap();
        assert_eq!(tkhd.payload().unwrap().len(), 96);
        assert_eq!(tkhd.read_u32(20), Some(5));
    }

    #[test]
    fn test_fragment_data_offset_points_into_mdat() {
        let fragment = FragmentBuilder::new(3, 1)
            .sample_durations(vec![100, 100])
            .build();
        let (moof_offset, moof) = find_box(&fragment, BoxType::MOOF).unwrap();
        let (mdat_offset, _) = find_box(&fragment, BoxType::MDAT).unwrap();

        let tree = find_tree(&fragment, BoxType::MOOF).unwrap();
        let trun = tree.child(BoxType::TRAF).unwrap().child(BoxType::TRUN).unwrap();
        let data_offset = trun.read_u32(8).unwrap() as usize;

        assert_eq!(moof_offset + data_offset, mdat_offset + 8);
        assert_eq!(mdat_offset, moof_offset + moof.declared_size as usize);
        assert_eq!(fragment[mdat_offset + 8], 3);
    }
}
