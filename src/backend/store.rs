use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const PAGE_EXT: &str = "jpg";
const THUMBNAIL: &str = "thumbnail.jpg";

/// A series as it lives on disk: `{title}_{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub title: String,
    pub id: String,
}

impl SeriesKey {
    pub fn new(title: &str, id: &str) -> Self {
        SeriesKey {
            title: sanitize(title),
            id: id.trim().to_string(),
        }
    }

    pub fn folder_name(&self) -> String {
        format!("{}_{}", self.title, self.id)
    }

    /// Splits a folder name on its last `_`. The id half must be all digits.
    ///
    /// A title ending in `_<digits>` is indistinguishable from the id
    /// boundary; the last segment always wins.
    pub fn parse(folder_name: &str) -> Option<Self> {
        let (title, id) = folder_name.rsplit_once('_')?;
        if title.is_empty() || id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(SeriesKey {
            title: title.to_string(),
            id: id.to_string(),
        })
    }
}

fn sanitize(title: &str) -> String {
    title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect()
}

/// Recovers `(episode, ordinal)` from `{title}_{id}_{episode}_{ordinal}.jpg`.
pub fn parse_page_filename(name: &str) -> Option<(u32, u32)> {
    let stem = name.strip_suffix(PAGE_EXT)?.strip_suffix('.')?;
    let mut parts = stem.rsplitn(3, '_');
    let ordinal = parts.next()?.parse().ok()?;
    let episode = parts.next()?.parse().ok()?;
    let rest = parts.next()?;
    if rest.is_empty() {
        return None;
    }
    Some((episode, ordinal))
}

/// Page images of one series folder.
///
/// Existence is coarse: one matching file marks an episode as present, so
/// an episode interrupted halfway is never fetched again.
#[derive(Debug, Clone)]
pub struct EpisodeStore {
    dir: PathBuf,
    key: SeriesKey,
}

impl EpisodeStore {
    pub fn new(library_root: &Path, key: SeriesKey) -> Self {
        Self {
            dir: library_root.join(key.folder_name()),
            key,
        }
    }

    /// Opens an existing series folder by path.
    pub fn open(series_dir: &Path) -> Result<Self> {
        let name = series_dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidSeries(series_dir.display().to_string()))?;
        let key = SeriesKey::parse(name).ok_or_else(|| Error::InvalidSeries(name.to_string()))?;
        Ok(Self {
            dir: series_dir.to_path_buf(),
            key,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::write(&self.dir, e))
    }

    pub fn page_filename(&self, episode: u32, ordinal: u32) -> String {
        format!(
            "{}_{}_{}_{}.{}",
            self.key.title, self.key.id, episode, ordinal, PAGE_EXT
        )
    }

    fn page_files(&self) -> Vec<(u32, u32, PathBuf)> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) => {
                log::debug!("cannot list {}: {}", self.dir.display(), e);
                return Vec::new();
            }
        };

        entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name();
                let (episode, ordinal) = parse_page_filename(name.to_str()?)?;
                Some((episode, ordinal, e.path()))
            })
            .collect()
    }

    pub fn exists(&self, episode: u32) -> bool {
        self.page_files().iter().any(|(ep, _, _)| *ep == episode)
    }

    /// Page files of one episode, ordered by ordinal (`_10` after `_9`).
    pub fn episode_pages(&self, episode: u32) -> Vec<(u32, PathBuf)> {
        let mut pages: Vec<_> = self
            .page_files()
            .into_iter()
            .filter(|(ep, _, _)| *ep == episode)
            .map(|(_, ordinal, path)| (ordinal, path))
            .collect();
        pages.sort_by_key(|(ordinal, _)| *ordinal);
        pages
    }

    pub fn episodes(&self) -> Vec<u32> {
        let mut episodes: Vec<u32> = self.page_files().into_iter().map(|(ep, _, _)| ep).collect();
        episodes.sort_unstable();
        episodes.dedup();
        episodes
    }

    /// Writes through a hidden temp file and renames it into place, so a
    /// reader never sees a half-written page.
    pub fn write(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.dir.join(filename);
        let tmp = self.dir.join(format!(".{}.part", filename));

        let written = fs::File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(bytes)?;
                file.sync_all()
            })
            .and_then(|_| fs::rename(&tmp, &path));

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(Error::write(path, e));
        }
        Ok(path)
    }

    pub fn thumbnail_path(&self) -> PathBuf {
        self.dir.join(THUMBNAIL)
    }

    pub fn has_thumbnail(&self) -> bool {
        self.thumbnail_path().exists()
    }

    pub fn write_thumbnail(&self, bytes: &[u8]) -> Result<PathBuf> {
        self.write(THUMBNAIL, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, EpisodeStore) {
        let root = tempfile::tempdir().unwrap();
        let store = EpisodeStore::new(root.path(), SeriesKey::new("Tower of God", "183559"));
        store.ensure_dir().unwrap();
        (root, store)
    }

    #[test]
    fn test_folder_name_round_trips_through_parse() {
        let key = SeriesKey::new("Tower_of_God", "183559");
        assert_eq!(key.folder_name(), "Tower_of_God_183559");
        assert_eq!(SeriesKey::parse("Tower_of_God_183559"), Some(key));
    }

    #[test]
    fn test_parse_rejects_non_series_folders() {
        assert_eq!(SeriesKey::parse("downloads"), None);
        assert_eq!(SeriesKey::parse("_183559"), None);
        assert_eq!(SeriesKey::parse("Title_"), None);
        assert_eq!(SeriesKey::parse("Title_12a"), None);
    }

    #[test]
    fn test_parse_ambiguous_trailing_number() {
        // "Season_2" plus id 77 reads back as title "Season_2".
        let key = SeriesKey::parse("Season_2_77").unwrap();
        assert_eq!(key.title, "Season_2");
        assert_eq!(key.id, "77");
        // Without an id the title's own number is taken as one.
        let key = SeriesKey::parse("Season_2").unwrap();
        assert_eq!(key.title, "Season");
        assert_eq!(key.id, "2");
    }

    #[test]
    fn test_title_is_sanitized() {
        let key = SeriesKey::new(" A/B: C? ", "1");
        assert_eq!(key.title, "A-B- C-");
    }

    #[test]
    fn test_parse_page_filename() {
        assert_eq!(parse_page_filename("Tower of God_183559_12_3.jpg"), Some((12, 3)));
        assert_eq!(parse_page_filename("T_1_2_3_4.jpg"), Some((3, 4)));
        assert_eq!(parse_page_filename("thumbnail.jpg"), None);
        assert_eq!(parse_page_filename("T_1_2_3.png"), None);
        assert_eq!(parse_page_filename("_2_3.jpg"), None);
        assert_eq!(parse_page_filename("last_read.txt"), None);
    }

    #[test]
    fn test_exists_is_coarse() {
        let (_root, store) = store();
        assert!(!store.exists(1));

        store.write(&store.page_filename(1, 4), b"x").unwrap();
        assert!(store.exists(1));
        assert!(!store.exists(11));
    }

    #[test]
    fn test_episode_pages_in_ordinal_order() {
        let (_root, store) = store();
        for ordinal in [10, 2, 1, 9] {
            store.write(&store.page_filename(5, ordinal), b"x").unwrap();
        }
        store.write(&store.page_filename(6, 1), b"x").unwrap();

        let ordinals: Vec<u32> = store.episode_pages(5).into_iter().map(|(o, _)| o).collect();
        assert_eq!(ordinals, vec![1, 2, 9, 10]);
        assert_eq!(store.episodes(), vec![5, 6]);
    }

    #[test]
    fn test_write_leaves_no_temp_file() {
        let (_root, store) = store();
        let path = store.write(&store.page_filename(1, 1), b"page").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"page");

        let names: Vec<String> = fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![store.page_filename(1, 1)]);
    }

    #[test]
    fn test_write_into_missing_dir_is_persistence_error() {
        let root = tempfile::tempdir().unwrap();
        let store = EpisodeStore::new(root.path(), SeriesKey::new("Gone", "9"));
        let err = store.write("x.jpg", b"x").unwrap_err();
        assert_eq!(err.kind(), Some(crate::error::FailureKind::PersistenceWrite));
    }

    #[test]
    fn test_open_existing_folder() {
        let (_root, store) = store();
        let reopened = EpisodeStore::open(store.dir()).unwrap();
        assert_eq!(reopened.key(), store.key());
        assert!(EpisodeStore::open(Path::new("/tmp/not-a-series")).is_err());
    }
}
