//! Box tree listing for the `inspect` command.

use bytes::Bytes;
use serde::Serialize;
use splicebox_media::boxes::{iter_boxes, parse_tree};
use splicebox_media::fragment::analyze_moof;
use splicebox_media::{BoxType, FragmentInfo, Mp4Box};
use std::fmt::Write as _;

/// One box in a file, flattened in file order.
#[derive(Debug, Clone, Serialize)]
pub struct BoxEntry {
    pub depth: usize,
    pub offset: u64,
    pub box_type: String,
    pub size: u64,
    /// Timing of the first track fragment, for `moof` boxes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment: Option<FragmentInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub file_size: u64,
    pub boxes: Vec<BoxEntry>,
    /// Bytes after the last readable top-level box.
    pub trailing_bytes: u64,
}

impl InspectReport {
    pub fn moof_count(&self) -> usize {
        self.boxes.iter().filter(|b| b.fragment.is_some()).count()
    }
}

/// Walk every box of `data`, descending into containers.
pub fn inspect(data: &Bytes) -> InspectReport {
    let mut boxes = Vec::new();
    let mut top_level = iter_boxes(data);

    for (offset, b) in top_level.by_ref() {
        match parse_tree(data, offset) {
            Ok(tree) => push_entries(&tree, 0, offset as u64, &mut boxes),
            Err(e) => {
                tracing::warn!("Could not expand '{}' at {}: {}", b.box_type, offset, e);
                push_entries(&b, 0, offset as u64, &mut boxes);
            }
        }
    }

    InspectReport {
        file_size: data.len() as u64,
        boxes,
        trailing_bytes: (data.len() - top_level.offset()) as u64,
    }
}

fn push_entries(b: &Mp4Box, depth: usize, offset: u64, out: &mut Vec<BoxEntry>) {
    let fragment = (b.box_type == BoxType::MOOF).then(|| analyze_moof(b));
    out.push(BoxEntry {
        depth,
        offset,
        box_type: b.box_type.to_string(),
        size: b.declared_size,
        fragment,
    });

    let mut child_offset = offset + u64::from(b.header_size);
    for child in b.children() {
        push_entries(child, depth + 1, child_offset, out);
        child_offset += child.declared_size;
    }
}

/// Indented text listing.
pub fn render_text(report: &InspectReport) -> String {
    let mut text = String::new();

    for entry in &report.boxes {
        let indent = "  ".repeat(entry.depth);
        let _ = write!(
            text,
            "{}{} @{} ({} bytes)",
            indent, entry.box_type, entry.offset, entry.size
        );
        if let Some(info) = &entry.fragment {
            let _ = write!(
                text,
                " decode_time={} samples={} duration={} ({:?})",
                info.base_decode_time,
                info.sample_count,
                info.total_duration,
                info.duration_source
            );
        }
        text.push('\n');
    }

    let _ = writeln!(
        text,
        "\n{} boxes, {} fragments, {} bytes",
        report.boxes.len(),
        report.moof_count(),
        report.file_size
    );
    if report.trailing_bytes > 0 {
        let _ = writeln!(text, "{} unreadable trailing bytes", report.trailing_bytes);
    }

    text
}
