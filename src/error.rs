use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The five ways the acquisition pipeline can fail.
///
/// Only `JobAbort` and `NavigationBoundary` ever reach the user; the other
/// three are contained where they happen and only show up as lower counts
/// (and as `DownloadEvent::Contained` on the progress channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    PageDecode,
    EpisodeExtraction,
    JobAbort,
    NavigationBoundary,
    PersistenceWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    NoPrevious,
    NoNext,
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Boundary::NoPrevious => f.write_str("no previous episode"),
            Boundary::NoNext => f.write_str("no next episode"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("episode {episode} page {ordinal}: could not decode image: {reason}")]
    PageDecode {
        episode: u32,
        ordinal: u32,
        reason: String,
    },

    #[error("episode {episode}: nothing to extract: {reason}")]
    EpisodeExtraction { episode: u32, reason: String },

    #[error("this series cannot be saved: no images found in episodes {start}-{end}")]
    JobAborted { start: u32, end: u32 },

    #[error("{0}")]
    NavigationBoundary(Boundary),

    #[error("failed to write {}: {source}", path.display())]
    PersistenceWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid episode range {start}-{end}")]
    InvalidRange { start: u32, end: u32 },

    #[error("not a series folder or id: {0}")]
    InvalidSeries(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Error::PageDecode { .. } => Some(FailureKind::PageDecode),
            Error::EpisodeExtraction { .. } => Some(FailureKind::EpisodeExtraction),
            Error::JobAborted { .. } => Some(FailureKind::JobAbort),
            Error::NavigationBoundary(_) => Some(FailureKind::NavigationBoundary),
            Error::PersistenceWrite { .. } => Some(FailureKind::PersistenceWrite),
            _ => None,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::PersistenceWrite {
            path: path.into(),
            source,
        }
    }
}
