//! Splicebox-Media: fragmented MP4 box handling and audio/video muxing
//!
//! Streaming players often receive video and audio as two separate
//! fragmented MP4 streams, each with its own init segment. This crate
//! combines such a pair into one playable fragmented MP4 file without
//! touching the encoded samples.
//!
//! # Modules
//!
//! - `boxes` - ISOBMFF box reading, tree parsing, serialization and field patching
//! - `fragment` - Per-fragment decode time and duration analysis
//! - `mux` - Combined init segment and interleaved, retimed fragments
//! - `capture` - Accumulator for the segments of one media item
//!
//! # Architecture
//!
//! All work happens on buffers already in memory. Parsed payloads are
//! zero-copy views into the input; every rewrite produces new bytes, so the
//! input buffers can be shared and reused after a mux.

pub mod boxes;
pub mod capture;
pub mod error;
pub mod fragment;
pub mod mux;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use boxes::{BoxBody, BoxType, Mp4Box};
pub use capture::MediaCapture;
pub use error::{Error, Result};
pub use fragment::{analyze, DurationSource, FragmentInfo};
pub use mux::{mux, MuxInput, MuxSummary, MuxedOutput, TrackKind, MIME_TYPE};
