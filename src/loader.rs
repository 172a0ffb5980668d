//! Loading captures from disk.
//!
//! A capture directory holds one subdirectory per stream, each with an init
//! segment and any number of fragment files:
//!
//! ```text
//! <id>/
//!   vid/init.mp4  vid/1.m4s  vid/2.m4s ...
//!   aud/init.mp4  aud/1.m4s  aud/2.m4s ...
//! ```
//!
//! Fragments are ordered by file name, comparing digit runs numerically so
//! that `seg-10.m4s` follows `seg-9.m4s`.

use crate::config::CaptureConfig;
use bytes::Bytes;
use splicebox_media::{MediaCapture, TrackKind};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{track} stream directory not found: {path:?}")]
    MissingStreamDir { track: TrackKind, path: PathBuf },

    #[error("{track} init segment not found: {path:?}")]
    MissingInit { track: TrackKind, path: PathBuf },

    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to list fragments: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Load a capture directory laid out per `config`.
///
/// The capture id is the directory name.
pub fn load_capture_dir(dir: &Path, config: &CaptureConfig) -> Result<MediaCapture, LoadError> {
    let id = dir
        .canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(dir)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "capture".to_string());

    let mut capture = MediaCapture::new(id);

    for (track, subdir) in [
        (TrackKind::Video, &config.video_dir),
        (TrackKind::Audio, &config.audio_dir),
    ] {
        let stream_dir = dir.join(subdir);
        if !stream_dir.is_dir() {
            return Err(LoadError::MissingStreamDir {
                track,
                path: stream_dir,
            });
        }

        let init_path = stream_dir.join(&config.init_file);
        if !init_path.is_file() {
            return Err(LoadError::MissingInit {
                track,
                path: init_path,
            });
        }
        let init = read_file(&init_path)?;

        let fragments =
            list_fragments(&stream_dir, &config.fragment_extension, &config.init_file)?;
        if fragments.is_empty() {
            tracing::warn!("No {} fragments in {:?}", track, stream_dir);
        }
        tracing::debug!(
            "Loading {} {} fragments from {:?}",
            fragments.len(),
            track,
            stream_dir
        );

        match track {
            TrackKind::Video => capture.set_video_init(init),
            TrackKind::Audio => capture.set_audio_init(init),
        }
        for path in &fragments {
            let fragment = read_file(path)?;
            match track {
                TrackKind::Video => capture.push_video_fragment(fragment),
                TrackKind::Audio => capture.push_audio_fragment(fragment),
            }
        }
    }

    Ok(capture)
}

/// Build a capture from explicit files, keeping the given fragment order.
pub fn load_files(
    id: &str,
    video_init: &Path,
    audio_init: &Path,
    video_fragments: &[PathBuf],
    audio_fragments: &[PathBuf],
) -> Result<MediaCapture, LoadError> {
    let mut capture = MediaCapture::new(id);
    capture.set_video_init(read_file(video_init)?);
    capture.set_audio_init(read_file(audio_init)?);
    for path in video_fragments {
        capture.push_video_fragment(read_file(path)?);
    }
    for path in audio_fragments {
        capture.push_audio_fragment(read_file(path)?);
    }
    Ok(capture)
}

/// Fragment files directly inside `dir`, in natural file name order.
pub fn list_fragments(
    dir: &Path,
    extension: &str,
    init_file: &str,
) -> Result<Vec<PathBuf>, LoadError> {
    let mut fragments = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.file_name().is_some_and(|name| name == init_file) {
            continue;
        }
        if path.extension().is_some_and(|ext| ext == extension) {
            fragments.push(path.to_path_buf());
        }
    }

    fragments.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));
    Ok(fragments)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_file(path: &Path) -> Result<Bytes, LoadError> {
    std::fs::read(path)
        .map(Bytes::from)
        .map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Compare strings treating runs of ASCII digits as numbers.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();

    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let left = take_digits(&mut a);
                let right = take_digits(&mut b);
                let ordering = compare_digit_runs(&left, &right);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a.next();
                b.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        digits.push(c);
        chars.next();
    }
    digits
}

fn compare_digit_runs(left: &str, right: &str) -> Ordering {
    let left_trimmed = left.trim_start_matches('0');
    let right_trimmed = right.trim_start_matches('0');
    left_trimmed
        .len()
        .cmp(&right_trimmed.len())
        .then_with(|| left_trimmed.cmp(right_trimmed))
        // "007" after "7" so distinct names never compare equal
        .then_with(|| left.len().cmp(&right.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_natural_cmp() {
        let mut names = vec!["seg-10.m4s", "seg-2.m4s", "seg-1.m4s", "seg-9.m4s", "seg-02.m4s"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(
            names,
            vec!["seg-1.m4s", "seg-2.m4s", "seg-02.m4s", "seg-9.m4s", "seg-10.m4s"]
        );

        assert_eq!(natural_cmp("a", "b"), Ordering::Less);
        assert_eq!(natural_cmp("a2", "a"), Ordering::Greater);
        assert_eq!(natural_cmp("x100y", "x100y"), Ordering::Equal);
        assert_eq!(natural_cmp("99999999999999999999999", "1"), Ordering::Greater);
    }

    #[test]
    fn test_list_fragments_filters_and_orders() {
        let dir = tempdir().unwrap();
        for name in ["init.mp4", "10.m4s", "2.m4s", "1.m4s", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("3.m4s")).unwrap();

        let fragments = list_fragments(dir.path(), "m4s", "init.mp4").unwrap();
        let names: Vec<_> = fragments.iter().map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["1.m4s", "2.m4s", "10.m4s"]);
    }

    #[test]
    fn test_init_file_is_never_a_fragment() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("init.m4s"), b"x").unwrap();
        fs::write(dir.path().join("0.m4s"), b"x").unwrap();

        let fragments = list_fragments(dir.path(), "m4s", "init.m4s").unwrap();
        assert_eq!(fragments.len(), 1);
    }

    #[test]
    fn test_missing_stream_dir() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("vid")).unwrap();
        fs::write(dir.path().join("vid/init.mp4"), b"x").unwrap();

        let err = load_capture_dir(dir.path(), &CaptureConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::MissingStreamDir {
                track: TrackKind::Audio,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_init() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("vid")).unwrap();
        fs::create_dir(dir.path().join("aud")).unwrap();

        let err = load_capture_dir(dir.path(), &CaptureConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::MissingInit {
                track: TrackKind::Video,
                ..
            }
        ));
    }

    #[test]
    fn test_load_files_keeps_order() {
        let dir = tempdir().unwrap();
        let path = |name: &str| dir.path().join(name);
        for (name, content) in [("v.mp4", "V"), ("a.mp4", "A"), ("b", "2"), ("a", "1")] {
            fs::write(path(name), content).unwrap();
        }

        let capture = load_files(
            "clip",
            &path("v.mp4"),
            &path("a.mp4"),
            &[path("b"), path("a")],
            &[],
        )
        .unwrap();
        assert_eq!(capture.id(), "clip");
        let video = capture.fragments(TrackKind::Video);
        assert_eq!(video[0].as_ref(), b"2");
        assert_eq!(video[1].as_ref(), b"1");
        assert!(capture.fragments(TrackKind::Audio).is_empty());

        let err = load_files("clip", &path("missing"), &path("a.mp4"), &[], &[]).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
