//! Shared helpers for integration tests.
//!
//! Builds synthetic captures with the `splicebox_media::fixtures` builders and
//! lays them out on disk the way the `mux` command expects.

#![allow(dead_code)]

use bytes::Bytes;
use splicebox_media::boxes::{iter_boxes, parse_tree};
use splicebox_media::fixtures::{FragmentBuilder, InitSegmentBuilder};
use splicebox_media::{BoxType, Mp4Box};
use std::fs;
use std::path::{Path, PathBuf};

/// One stream of a synthetic capture.
pub struct Stream {
    pub init: Bytes,
    pub fragments: Vec<Bytes>,
}

impl Stream {
    /// `count` fragments of `samples` samples, each `duration` ticks long.
    ///
    /// Source decode times start far from zero so rewriting is observable.
    pub fn new(init: InitSegmentBuilder, count: u32, samples: usize, duration: u32) -> Self {
        let fragments = (0..count)
            .map(|i| {
                FragmentBuilder::new(100 + i, 1)
                    .base_media_decode_time(5_000_000 + u64::from(i) * u64::from(duration))
                    .sample_durations(vec![duration; samples])
                    .build()
            })
            .collect();
        Self {
            init: init.build(),
            fragments,
        }
    }

    pub fn video(count: u32) -> Self {
        Self::new(InitSegmentBuilder::video(), count, 30, 3000)
    }

    pub fn audio(count: u32) -> Self {
        Self::new(InitSegmentBuilder::audio(), count, 47, 1024)
    }
}

/// Write a capture directory `<root>/<id>/{vid,aud}/...` and return its path.
pub fn write_capture(root: &Path, id: &str, video: &Stream, audio: &Stream) -> PathBuf {
    let dir = root.join(id);
    write_stream(&dir.join("vid"), video);
    write_stream(&dir.join("aud"), audio);
    dir
}

fn write_stream(dir: &Path, stream: &Stream) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("init.mp4"), &stream.init).unwrap();
    for (i, fragment) in stream.fragments.iter().enumerate() {
        fs::write(dir.join(format!("seg-{}.m4s", i + 1)), fragment).unwrap();
    }
}

/// Top-level boxes of a buffer, fully parsed.
pub fn top_level(data: &Bytes) -> Vec<(usize, Mp4Box)> {
    iter_boxes(data)
        .map(|(offset, _)| (offset, parse_tree(data, offset).unwrap()))
        .collect()
}

/// Every `moof` in file order.
pub fn moofs(data: &Bytes) -> Vec<Mp4Box> {
    top_level(data)
        .into_iter()
        .map(|(_, b)| b)
        .filter(|b| b.box_type == BoxType::MOOF)
        .collect()
}

pub fn traf(moof: &Mp4Box) -> &Mp4Box {
    moof.child(BoxType::TRAF).unwrap()
}

pub fn sequence_number(moof: &Mp4Box) -> u32 {
    moof.child(BoxType::MFHD).unwrap().read_u32(4).unwrap()
}

pub fn fragment_track_id(moof: &Mp4Box) -> u32 {
    traf(moof).child(BoxType::TFHD).unwrap().read_u32(4).unwrap()
}

/// Base decode time of a version 1 `tfdt`.
pub fn decode_time(moof: &Mp4Box) -> u64 {
    let tfdt = traf(moof).child(BoxType::TFDT).unwrap();
    (u64::from(tfdt.read_u32(4).unwrap()) << 32) | u64::from(tfdt.read_u32(8).unwrap())
}
