//! Splicebox - fragmented MP4 audio/video muxing tool
//!
//! This library crate exposes the host-side functionality for integration testing.

pub mod config;
pub mod inspect;
pub mod loader;
