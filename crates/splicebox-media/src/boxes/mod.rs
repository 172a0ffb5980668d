//! ISOBMFF box model.
//!
//! A box is `[size][4-byte type][payload]`. Payloads are zero-copy [`Bytes`]
//! views into the buffer they were read from; container payloads are expanded
//! into child boxes by [`parse_tree`].

mod codec;
pub mod layout;
mod patch;
mod tree;

pub use codec::{find_box, iter_boxes, read_box, serialize_box, write_box, BoxIter, HEADER_SIZE};
pub use patch::{patch_u32, read_u32};
pub use tree::{find_tree, parse_tree};

pub(crate) use tree::expand;

use crate::{Error, Result};
use bytes::Bytes;

/// Four-character box type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxType(pub [u8; 4]);

impl BoxType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const STYP: Self = Self(*b"styp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const EDTS: Self = Self(*b"edts");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const DINF: Self = Self(*b"dinf");
    pub const STBL: Self = Self(*b"stbl");
    pub const UDTA: Self = Self(*b"udta");
    pub const META: Self = Self(*b"meta");
    pub const ILST: Self = Self(*b"ilst");
    pub const MVEX: Self = Self(*b"mvex");
    pub const TREX: Self = Self(*b"trex");
    pub const MOOF: Self = Self(*b"moof");
    pub const MFHD: Self = Self(*b"mfhd");
    pub const TRAF: Self = Self(*b"traf");
    pub const TFHD: Self = Self(*b"tfhd");
    pub const TFDT: Self = Self(*b"tfdt");
    pub const TRUN: Self = Self(*b"trun");
    pub const MFRA: Self = Self(*b"mfra");
    pub const MDAT: Self = Self(*b"mdat");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }

    /// Whether the payload of this box type is a sequence of boxes.
    ///
    /// This is the only signal used to decide recursive expansion; every
    /// other type is an opaque leaf.
    pub fn is_container(&self) -> bool {
        matches!(
            *self,
            Self::MOOV
                | Self::TRAK
                | Self::MDIA
                | Self::MINF
                | Self::STBL
                | Self::DINF
                | Self::EDTS
                | Self::UDTA
                | Self::MVEX
                | Self::META
                | Self::ILST
                | Self::MOOF
                | Self::TRAF
                | Self::MFRA
        )
    }
}

impl std::fmt::Display for BoxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Box contents: opaque bytes or parsed children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoxBody {
    Raw(Bytes),
    Children(Vec<Mp4Box>),
}

/// A single box, possibly with parsed children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mp4Box {
    /// Box type code.
    pub box_type: BoxType,
    /// Size as declared in the source header (header included).
    pub declared_size: u64,
    /// Size of the source header (8 or 16 bytes).
    pub header_size: u8,
    /// Payload or children.
    pub body: BoxBody,
}

impl Mp4Box {
    /// Create a leaf box around an existing payload.
    pub fn raw(box_type: BoxType, payload: Bytes) -> Self {
        let mut b = Self {
            box_type,
            declared_size: 0,
            header_size: HEADER_SIZE as u8,
            body: BoxBody::Raw(payload),
        };
        b.declared_size = b.encoded_len();
        b
    }

    /// Create a container box from children.
    pub fn container(box_type: BoxType, children: Vec<Mp4Box>) -> Self {
        let mut b = Self {
            box_type,
            declared_size: 0,
            header_size: HEADER_SIZE as u8,
            body: BoxBody::Children(children),
        };
        b.declared_size = b.encoded_len();
        b
    }

    /// Raw payload, if this box was not expanded.
    pub fn payload(&self) -> Option<&Bytes> {
        match &self.body {
            BoxBody::Raw(payload) => Some(payload),
            BoxBody::Children(_) => None,
        }
    }

    /// Parsed children; empty for leaf boxes.
    pub fn children(&self) -> &[Mp4Box] {
        match &self.body {
            BoxBody::Children(children) => children,
            BoxBody::Raw(_) => &[],
        }
    }

    /// First child of the given type.
    pub fn child(&self, box_type: BoxType) -> Option<&Mp4Box> {
        self.children().iter().find(|c| c.box_type == box_type)
    }

    /// First child of the given type, mutably.
    pub fn child_mut(&mut self, box_type: BoxType) -> Option<&mut Mp4Box> {
        match &mut self.body {
            BoxBody::Children(children) => children.iter_mut().find(|c| c.box_type == box_type),
            BoxBody::Raw(_) => None,
        }
    }

    /// Remove and return the first child of the given type.
    pub fn take_child(&mut self, box_type: BoxType) -> Option<Mp4Box> {
        match &mut self.body {
            BoxBody::Children(children) => {
                let index = children.iter().position(|c| c.box_type == box_type)?;
                Some(children.remove(index))
            }
            BoxBody::Raw(_) => None,
        }
    }

    /// Full-box version byte (first payload byte).
    pub fn version(&self) -> Option<u8> {
        self.payload().and_then(|p| p.first().copied())
    }

    /// Full-box flags (low 24 bits of the first payload word).
    pub fn flags(&self) -> Option<u32> {
        self.read_u32(0).map(|word| word & 0x00FF_FFFF)
    }

    /// Read a big-endian u32 from the raw payload.
    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        self.payload().and_then(|p| read_u32(p, offset))
    }

    /// Overwrite a big-endian u32 in the payload.
    ///
    /// The payload is rebound to a patched copy; the bytes this box was read
    /// from are left untouched.
    pub fn patch_u32(&mut self, offset: usize, value: u32) -> Result<()> {
        let BoxBody::Raw(payload) = &self.body else {
            return Err(Error::malformed(
                offset,
                format!("cannot patch a field inside container '{}'", self.box_type),
            ));
        };
        let patched = patch_u32(payload, offset, value).map_err(|_| {
            Error::malformed(
                offset,
                format!(
                    "field of '{}' does not fit in its {}-byte payload",
                    self.box_type,
                    payload.len()
                ),
            )
        })?;
        self.body = BoxBody::Raw(patched);
        Ok(())
    }

    /// Length of the content after the header.
    pub fn content_len(&self) -> u64 {
        match &self.body {
            BoxBody::Raw(payload) => payload.len() as u64,
            BoxBody::Children(children) => children.iter().map(Mp4Box::encoded_len).sum(),
        }
    }

    /// Total length this box serializes to, header included.
    pub fn encoded_len(&self) -> u64 {
        let content = self.content_len();
        if content + HEADER_SIZE as u64 > u32::MAX as u64 {
            content + 16
        } else {
            content + HEADER_SIZE as u64
        }
    }
}
