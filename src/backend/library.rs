use std::fs;
use std::path::{Path, PathBuf};

use super::position::{PositionMarker, ReadingPosition};
use super::store::{EpisodeStore, SeriesKey};
use crate::error::{Error, Result};

/// A downloaded series folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub key: SeriesKey,
    pub dir: PathBuf,
    pub episodes: Vec<u32>,
    pub last_read: Option<ReadingPosition>,
}

impl LibraryEntry {
    /// Reads a folder as a library entry; `None` when its name is not
    /// `{title}_{id}`.
    pub fn parse(dir: &Path) -> Option<Self> {
        let key = SeriesKey::parse(dir.file_name()?.to_str()?)?;
        let store = EpisodeStore::new(dir.parent()?, key.clone());
        Some(Self {
            episodes: store.episodes(),
            last_read: PositionMarker::new(dir).load(),
            key,
            dir: dir.to_path_buf(),
        })
    }

    pub fn store(&self) -> EpisodeStore {
        EpisodeStore::new(self.dir.parent().unwrap_or(Path::new(".")), self.key.clone())
    }

    pub fn resume_episode(&self) -> u32 {
        self.last_read.map(|p| p.episode).unwrap_or(1)
    }

    /// One display line per entry; the last-read episode gets a star.
    pub fn summary(&self) -> String {
        let episodes: Vec<String> = self
            .episodes
            .iter()
            .map(|&ep| match self.last_read {
                Some(pos) if pos.episode == ep => format!("{}*", ep),
                _ => ep.to_string(),
            })
            .collect();
        format!(
            "{} [{}] episodes: {}",
            self.key.title,
            self.key.id,
            if episodes.is_empty() {
                "-".to_string()
            } else {
                episodes.join(", ")
            }
        )
    }
}

#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
}

impl Library {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scan(&self) -> Result<Vec<LibraryEntry>> {
        let mut entries: Vec<LibraryEntry> = fs::read_dir(&self.root)?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| LibraryEntry::parse(&e.path()))
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Case-insensitive match on title or id.
    pub fn filter(&self, keyword: &str) -> Result<Vec<LibraryEntry>> {
        let keyword = keyword.to_lowercase();
        Ok(self
            .scan()?
            .into_iter()
            .filter(|entry| {
                entry.key.title.to_lowercase().contains(&keyword) || entry.key.id == keyword
            })
            .collect())
    }

    /// Finds an entry by folder name or by series id.
    pub fn find(&self, name_or_id: &str) -> Result<LibraryEntry> {
        self.scan()?
            .into_iter()
            .find(|entry| entry.key.folder_name() == name_or_id || entry.key.id == name_or_id)
            .ok_or_else(|| Error::InvalidSeries(name_or_id.to_string()))
    }

    pub fn remove(&self, entry: &LibraryEntry) -> Result<()> {
        log::info!("removing {}", entry.dir.display());
        fs::remove_dir_all(&entry.dir)?;
        Ok(())
    }
}
