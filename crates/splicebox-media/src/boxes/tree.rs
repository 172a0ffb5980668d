//! Recursive box tree building.

use super::codec::{iter_boxes, read_box, read_child_box};
use super::{BoxBody, BoxType, Mp4Box};
use crate::Result;
use bytes::Bytes;

/// Parse the box at `offset` and, if it is a container, all of its descendants.
///
/// Expansion is best effort: inside a container, parsing stops at the first
/// sub-box that cannot be read and the rest of that payload is dropped from
/// the tree. Only a failure to read the box at `offset` itself is an error.
pub fn parse_tree(buf: &Bytes, offset: usize) -> Result<Mp4Box> {
    let root = read_box(buf, offset)?;
    Ok(expand(root))
}

/// Find the first top-level box of the given type and parse its subtree.
pub fn find_tree(buf: &Bytes, box_type: BoxType) -> Option<Mp4Box> {
    iter_boxes(buf)
        .find(|(_, b)| b.box_type == box_type)
        .map(|(_, b)| expand(b))
}

/// Expand a freshly read box into its subtree.
pub(crate) fn expand(b: Mp4Box) -> Mp4Box {
    let mut path = Vec::new();
    expand_at(b, &mut path)
}

fn expand_at(mut b: Mp4Box, path: &mut Vec<BoxType>) -> Mp4Box {
    if !b.box_type.is_container() {
        return b;
    }
    let BoxBody::Raw(payload) = &b.body else {
        return b;
    };
    let payload = payload.clone();

    path.push(b.box_type);
    let mut children = Vec::new();
    let mut offset = 0;
    while offset < payload.len() {
        match read_child_box(&payload, offset) {
            Ok(child) => {
                offset += child.declared_size as usize;
                children.push(expand_at(child, path));
            }
            Err(e) => {
                tracing::warn!(
                    "Truncated subtree in {}: dropping {} bytes ({})",
                    path_string(path),
                    payload.len() - offset,
                    e
                );
                break;
            }
        }
    }
    path.pop();

    b.body = BoxBody::Children(children);
    b
}

fn path_string(path: &[BoxType]) -> String {
    path.iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join("/")
}
