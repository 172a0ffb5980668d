//! Box header reading and box serialization.

use super::{BoxBody, BoxType, Mp4Box};
use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Size of a compact box header (32-bit size + type).
pub const HEADER_SIZE: usize = 8;

/// Size of a header using the 64-bit extended size form.
const EXTENDED_HEADER_SIZE: usize = 16;

/// Read the box starting at `offset` in a top-level buffer.
///
/// A declared size of 0 extends the box to the end of `buf`. The returned
/// payload is a view into `buf`; nothing is copied.
pub fn read_box(buf: &Bytes, offset: usize) -> Result<Mp4Box> {
    read_box_at(buf, offset, true)
}

/// Read a box nested inside a container payload, where size 0 is not allowed.
pub(crate) fn read_child_box(buf: &Bytes, offset: usize) -> Result<Mp4Box> {
    read_box_at(buf, offset, false)
}

fn read_box_at(buf: &Bytes, offset: usize, top_level: bool) -> Result<Mp4Box> {
    let remaining = buf.len().saturating_sub(offset);
    if remaining < HEADER_SIZE {
        return Err(Error::malformed(
            offset,
            format!("need {} header bytes, have {}", HEADER_SIZE, remaining),
        ));
    }

    let header = &buf[offset..offset + HEADER_SIZE];
    let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let box_type = BoxType::from_bytes([header[4], header[5], header[6], header[7]]);

    let (actual_size, header_size) = match size {
        1 => {
            if remaining < EXTENDED_HEADER_SIZE {
                return Err(Error::malformed(
                    offset,
                    format!("extended size header of '{}' overruns buffer", box_type),
                ));
            }
            let ext = &buf[offset + HEADER_SIZE..offset + EXTENDED_HEADER_SIZE];
            let large = u64::from_be_bytes([
                ext[0], ext[1], ext[2], ext[3], ext[4], ext[5], ext[6], ext[7],
            ]);
            (large, EXTENDED_HEADER_SIZE)
        }
        0 if top_level => (remaining as u64, HEADER_SIZE),
        0 => {
            return Err(Error::malformed(
                offset,
                format!("'{}' declares size 0 inside a container", box_type),
            ));
        }
        n => (n as u64, HEADER_SIZE),
    };

    if actual_size < header_size as u64 {
        return Err(Error::malformed(
            offset,
            format!(
                "'{}' declares size {} smaller than its {}-byte header",
                box_type, actual_size, header_size
            ),
        ));
    }
    if actual_size > remaining as u64 {
        return Err(Error::malformed(
            offset,
            format!(
                "'{}' declares size {} but only {} bytes remain",
                box_type, actual_size, remaining
            ),
        ));
    }

    let end = offset + actual_size as usize;
    Ok(Mp4Box {
        box_type,
        declared_size: actual_size,
        header_size: header_size as u8,
        body: BoxBody::Raw(buf.slice(offset + header_size..end)),
    })
}

/// Iterator over the top-level boxes of a buffer.
///
/// Yields `(offset, box)` pairs and stops at the first header that cannot be
/// read; [`BoxIter::offset`] then points at the unread tail.
pub struct BoxIter<'a> {
    buf: &'a Bytes,
    offset: usize,
    done: bool,
}

impl BoxIter<'_> {
    /// Offset of the next unread byte.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for BoxIter<'_> {
    type Item = (usize, Mp4Box);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.buf.len() {
            return None;
        }
        match read_box(self.buf, self.offset) {
            Ok(b) => {
                let at = self.offset;
                self.offset += b.declared_size as usize;
                Some((at, b))
            }
            Err(_) => {
                self.done = true;
                None
            }
        }
    }
}

/// Iterate over the top-level boxes of `buf`.
pub fn iter_boxes(buf: &Bytes) -> BoxIter<'_> {
    BoxIter {
        buf,
        offset: 0,
        done: false,
    }
}

/// Find the first top-level box of the given type, with its offset.
pub fn find_box(buf: &Bytes, box_type: BoxType) -> Option<(usize, Mp4Box)> {
    iter_boxes(buf).find(|(_, b)| b.box_type == box_type)
}

/// Serialize a box and its children, recomputing every size field.
pub fn serialize_box(b: &Mp4Box) -> Bytes {
    let mut buf = BytesMut::with_capacity(b.encoded_len() as usize);
    write_box(b, &mut buf);
    buf.freeze()
}

/// Append a serialized box to `buf`.
///
/// The compact 32-bit size form is used unless the box is too large for it.
pub fn write_box(b: &Mp4Box, buf: &mut BytesMut) {
    let size = b.encoded_len();
    if size > u32::MAX as u64 {
        buf.put_u32(1);
        buf.put_slice(&b.box_type.0);
        buf.put_u64(size);
    } else {
        buf.put_u32(size as u32);
        buf.put_slice(&b.box_type.0);
    }

    match &b.body {
        BoxBody::Raw(payload) => buf.put_slice(payload),
        BoxBody::Children(children) => {
            for child in children {
                write_box(child, buf);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::raw_box;

    #[test]
    fn test_read_basic_box() {
        let buf = Bytes::from(raw_box(b"free", &[1, 2, 3, 4]));
        let b = read_box(&buf, 0).unwrap();

        assert_eq!(b.box_type, BoxType::from_bytes(*b"free"));
        assert_eq!(b.declared_size, 12);
        assert_eq!(b.header_size, 8);
        assert_eq!(b.payload().unwrap().as_ref(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_read_is_zero_copy() {
        let buf = Bytes::from(raw_box(b"free", &[9; 32]));
        let b = read_box(&buf, 0).unwrap();
        let payload = b.payload().unwrap();
        assert_eq!(payload.as_ptr(), buf[8..].as_ptr());
    }

    #[test]
    fn test_read_extended_size() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&20u64.to_be_bytes());
        data.extend_from_slice(&[7, 7, 7, 7]);
        let buf = Bytes::from(data);

        let b = read_box(&buf, 0).unwrap();
        assert_eq!(b.declared_size, 20);
        assert_eq!(b.header_size, 16);
        assert_eq!(b.payload().unwrap().as_ref(), &[7, 7, 7, 7]);
    }

    #[test]
    fn test_read_extended_header_overrun() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&[0, 0, 0]);
        let buf = Bytes::from(data);

        assert!(matches!(
            read_box(&buf, 0),
            Err(Error::MalformedBox { offset: 0, .. })
        ));
    }

    #[test]
    fn test_read_size_zero_extends_to_end() {
        let mut data = vec![0u8; 500];
        data[104..108].copy_from_slice(b"mdat");
        let buf = Bytes::from(data);

        let b = read_box(&buf, 100).unwrap();
        assert_eq!(b.box_type, BoxType::MDAT);
        assert_eq!(b.declared_size, 400);
        assert_eq!(b.payload().unwrap().len(), 392);
    }

    #[test]
    fn test_child_size_zero_rejected() {
        let mut data = vec![0u8; 16];
        data[4..8].copy_from_slice(b"free");
        let buf = Bytes::from(data);

        assert!(read_child_box(&buf, 0).is_err());
        assert!(read_box(&buf, 0).is_ok());
    }

    #[test]
    fn test_read_too_short() {
        let buf = Bytes::from_static(&[0, 0, 0, 8, b'f', b'r']);
        assert!(read_box(&buf, 0).is_err());
        assert!(read_box(&buf, 100).is_err());
    }

    #[test]
    fn test_read_size_overruns_buffer() {
        let mut data = raw_box(b"free", &[0; 4]);
        data[0..4].copy_from_slice(&64u32.to_be_bytes());
        let buf = Bytes::from(data);

        let err = read_box(&buf, 0).unwrap_err();
        assert!(err.to_string().contains("only 12 bytes remain"));
    }

    #[test]
    fn test_read_size_smaller_than_header() {
        let mut data = raw_box(b"free", &[0; 4]);
        data[0..4].copy_from_slice(&4u32.to_be_bytes());
        let buf = Bytes::from(data);
        assert!(read_box(&buf, 0).is_err());
    }

    #[test]
    fn test_iter_and_find() {
        let mut data = raw_box(b"styp", b"msdh");
        data.extend(raw_box(b"moof", &[]));
        data.extend(raw_box(b"mdat", &[1, 2]));
        data.extend_from_slice(&[0, 0]);
        let buf = Bytes::from(data);

        let mut iter = iter_boxes(&buf);
        let types: Vec<_> = iter.by_ref().map(|(off, b)| (off, b.box_type)).collect();
        assert_eq!(
            types,
            vec![(0, BoxType::STYP), (12, BoxType::MOOF), (20, BoxType::MDAT)]
        );
        assert_eq!(iter.offset(), 30);

        let (offset, mdat) = find_box(&buf, BoxType::MDAT).unwrap();
        assert_eq!(offset, 20);
        assert_eq!(mdat.declared_size, 10);
        assert!(find_box(&buf, BoxType::MOOV).is_none());
    }

    #[test]
    fn test_serialize_recomputes_size() {
        let trex = Mp4Box::raw(BoxType::TREX, Bytes::from_static(&[0u8; 24]));
        let mut mvex = Mp4Box::container(BoxType::MVEX, vec![trex]);
        mvex.declared_size = 9999;

        let out = serialize_box(&mvex);
        assert_eq!(out.len(), 40);
        assert_eq!(&out[0..4], &40u32.to_be_bytes());
        assert_eq!(&out[4..8], b"mvex");
        assert_eq!(&out[8..12], &32u32.to_be_bytes());
        assert_eq!(&out[12..16], b"trex");
    }

    #[test]
    fn test_serialize_extended_source_as_compact() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(b"free");
        data.extend_from_slice(&18u64.to_be_bytes());
        data.extend_from_slice(&[5, 6]);
        let buf = Bytes::from(data);

        let out = serialize_box(&read_box(&buf, 0).unwrap());
        assert_eq!(out.as_ref(), raw_box(b"free", &[5, 6]).as_slice());
    }
}
