//! Movie streams.

use std::path::{Path, PathBuf};

use crate::backend::StreamInfo;

/// An opened movie stream and its playback flag.
#[derive(Debug)]
pub struct Movie {
    path: PathBuf,
    info: StreamInfo,
    playing: bool,
}

impl Movie {
    pub(crate) fn new(path: PathBuf, info: StreamInfo) -> Self {
        Self {
            path,
            info,
            playing: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn width(&self) -> u32 {
        self.info.width
    }

    pub fn height(&self) -> u32 {
        self.info.height
    }

    pub fn frames(&self) -> u32 {
        self.info.frames
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }
}
