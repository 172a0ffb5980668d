//! Segments collected for one media item.

use crate::mux::{mux, MuxInput, MuxedOutput, TrackKind};
use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Init segments and fragments captured for one media identifier.
///
/// Filled by whatever collects the segments, then muxed or exported. The
/// capture itself is never modified by muxing.
#[derive(Debug, Clone, Default)]
pub struct MediaCapture {
    id: String,
    init_video: Option<Bytes>,
    init_audio: Option<Bytes>,
    video_fragments: Vec<Bytes>,
    audio_fragments: Vec<Bytes>,
    video_codec: Option<String>,
    audio_codec: Option<String>,
}

impl MediaCapture {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_video_init(&mut self, init: Bytes) {
        self.init_video = Some(init);
    }

    pub fn set_audio_init(&mut self, init: Bytes) {
        self.init_audio = Some(init);
    }

    pub fn set_video_codec(&mut self, codec: impl Into<String>) {
        self.video_codec = Some(codec.into());
    }

    pub fn set_audio_codec(&mut self, codec: impl Into<String>) {
        self.audio_codec = Some(codec.into());
    }

    pub fn push_video_fragment(&mut self, fragment: Bytes) {
        self.video_fragments.push(fragment);
    }

    pub fn push_audio_fragment(&mut self, fragment: Bytes) {
        self.audio_fragments.push(fragment);
    }

    pub fn video_codec(&self) -> Option<&str> {
        self.video_codec.as_deref()
    }

    pub fn audio_codec(&self) -> Option<&str> {
        self.audio_codec.as_deref()
    }

    pub fn init(&self, track: TrackKind) -> Option<&Bytes> {
        match track {
            TrackKind::Video => self.init_video.as_ref(),
            TrackKind::Audio => self.init_audio.as_ref(),
        }
    }

    pub fn fragments(&self, track: TrackKind) -> &[Bytes] {
        match track {
            TrackKind::Video => &self.video_fragments,
            TrackKind::Audio => &self.audio_fragments,
        }
    }

    /// Total bytes held, init segments included.
    pub fn byte_len(&self) -> usize {
        [TrackKind::Video, TrackKind::Audio]
            .into_iter()
            .map(|track| {
                self.init(track).map_or(0, Bytes::len)
                    + self.fragments(track).iter().map(Bytes::len).sum::<usize>()
            })
            .sum()
    }

    /// Both init segments and at least one fragment per stream are present.
    pub fn is_ready(&self) -> bool {
        self.init_video.is_some()
            && self.init_audio.is_some()
            && !self.video_fragments.is_empty()
            && !self.audio_fragments.is_empty()
    }

    /// Mux the captured streams into one file.
    pub fn mux(&self) -> Result<MuxedOutput> {
        let video_init = self
            .init_video
            .as_ref()
            .ok_or(Error::IncompleteCapture("no video init segment"))?;
        let audio_init = self
            .init_audio
            .as_ref()
            .ok_or(Error::IncompleteCapture("no audio init segment"))?;

        tracing::debug!(
            "Muxing capture {} ({} video, {} audio fragments)",
            self.id,
            self.video_fragments.len(),
            self.audio_fragments.len()
        );

        mux(MuxInput {
            video_init,
            audio_init,
            video_fragments: &self.video_fragments,
            audio_fragments: &self.audio_fragments,
        })
    }

    /// A single-stream file: the stream's init segment followed by its
    /// fragments, unmodified.
    pub fn export_track(&self, track: TrackKind) -> Result<Bytes> {
        let (init, fragments) = match track {
            TrackKind::Video => (
                self.init_video
                    .as_ref()
                    .ok_or(Error::IncompleteCapture("no video init segment"))?,
                &self.video_fragments,
            ),
            TrackKind::Audio => (
                self.init_audio
                    .as_ref()
                    .ok_or(Error::IncompleteCapture("no audio init segment"))?,
                &self.audio_fragments,
            ),
        };
        if fragments.is_empty() {
            return Err(Error::IncompleteCapture("no fragments for the exported track"));
        }

        let len = init.len() + fragments.iter().map(Bytes::len).sum::<usize>();
        let mut out = BytesMut::with_capacity(len);
        out.put_slice(init);
        for fragment in fragments {
            out.put_slice(fragment);
        }

        tracing::debug!(
            "Exported {} track of {}: {} fragments, {} bytes",
            track,
            self.id,
            fragments.len(),
            len
        );
        Ok(out.freeze())
    }
}
