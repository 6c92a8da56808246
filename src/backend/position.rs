use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const MARKER_FILE: &str = "last_read.txt";

/// Where a reader left off: episode plus page ordinal within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingPosition {
    pub episode: u32,
    pub ordinal: u32,
}

impl ReadingPosition {
    pub fn new(episode: u32, ordinal: u32) -> Self {
        Self { episode, ordinal }
    }

    /// Accepts `episode:ordinal` and the older bare `episode`, which reads
    /// as ordinal 0.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (episode, ordinal) = match text.split_once(':') {
            Some((ep, idx)) => (ep.trim().parse().ok()?, idx.trim().parse().ok()?),
            None => (text.parse().ok()?, 0),
        };
        if episode == 0 {
            return None;
        }
        Some(Self { episode, ordinal })
    }
}

impl fmt::Display for ReadingPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.episode, self.ordinal)
    }
}

/// The per-series `last_read.txt` marker.
#[derive(Debug, Clone)]
pub struct PositionMarker {
    path: PathBuf,
}

impl PositionMarker {
    pub fn new(series_dir: &Path) -> Self {
        Self {
            path: series_dir.join(MARKER_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<ReadingPosition> {
        let content = fs::read_to_string(&self.path).ok()?;
        let position = ReadingPosition::parse(&content);
        if position.is_none() {
            log::warn!("unreadable position marker {}", self.path.display());
        }
        position
    }

    pub fn save(&self, position: ReadingPosition) -> Result<()> {
        fs::write(&self.path, position.to_string()).map_err(|e| Error::write(&self.path, e))
    }
}
