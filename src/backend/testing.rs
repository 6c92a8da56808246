use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::source::{ComicSource, EpisodeListing, SeriesInfo};
use crate::error::{Error, Result};

const THUMBNAIL_URL: &str = "mock://thumbnail";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Pages(usize),
    NoTitle,
    NoImages,
}

#[derive(Debug, Clone)]
pub struct MockEpisode {
    kind: Kind,
    extract_delay: u64,
    page_delay: u64,
    broken: Vec<u32>,
}

impl MockEpisode {
    fn of(kind: Kind) -> Self {
        Self {
            kind,
            extract_delay: 0,
            page_delay: 0,
            broken: Vec::new(),
        }
    }

    pub fn pages(count: usize) -> Self {
        Self::of(Kind::Pages(count))
    }

    pub fn no_title() -> Self {
        Self::of(Kind::NoTitle)
    }

    pub fn no_images() -> Self {
        Self::of(Kind::NoImages)
    }

    pub fn extract_delay(mut self, ms: u64) -> Self {
        self.extract_delay = ms;
        self
    }

    pub fn page_delay(mut self, ms: u64) -> Self {
        self.page_delay = ms;
        self
    }

    /// Serves garbage bytes for this page ordinal.
    pub fn broken(mut self, ordinal: u32) -> Self {
        self.broken.push(ordinal);
        self
    }
}

/// In-memory site: every page is a tiny generated PNG.
#[derive(Default)]
pub struct MockSource {
    episodes: HashMap<u32, MockEpisode>,
    thumbnail: bool,
    episode_calls: AtomicUsize,
    page_calls: AtomicUsize,
    info_calls: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn episode(mut self, episode: u32, mock: MockEpisode) -> Self {
        self.episodes.insert(episode, mock);
        self
    }

    pub fn with_thumbnail(mut self) -> Self {
        self.thumbnail = true;
        self
    }

    pub fn episode_calls(&self) -> usize {
        self.episode_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.episode_calls()
            + self.page_calls.load(Ordering::SeqCst)
            + self.info_calls.load(Ordering::SeqCst)
    }
}

pub fn png_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(2, 3))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn parse_page_url(url: &str) -> Option<(u32, u32)> {
    let rest = url.strip_prefix("mock://")?;
    let (episode, ordinal) = rest.split_once('/')?;
    Some((episode.parse().ok()?, ordinal.parse().ok()?))
}

#[async_trait]
impl ComicSource for MockSource {
    async fn fetch_episode(&self, _series_id: &str, episode: u32) -> Result<Option<EpisodeListing>> {
        self.episode_calls.fetch_add(1, Ordering::SeqCst);
        let Some(mock) = self.episodes.get(&episode) else {
            return Ok(None);
        };
        if mock.extract_delay > 0 {
            tokio::time::sleep(Duration::from_millis(mock.extract_delay)).await;
        }

        Ok(match mock.kind {
            Kind::NoTitle => None,
            Kind::NoImages => Some(EpisodeListing {
                title: "Mock".to_string(),
                page_urls: Vec::new(),
            }),
            Kind::Pages(count) => Some(EpisodeListing {
                title: "Mock".to_string(),
                page_urls: (1..=count)
                    .map(|ordinal| format!("mock://{}/{}", episode, ordinal))
                    .collect(),
            }),
        })
    }

    async fn fetch_page(&self, url: &str) -> Result<Vec<u8>> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if url == THUMBNAIL_URL {
            return Ok(png_bytes());
        }

        let (episode, ordinal) = parse_page_url(url).ok_or_else(|| Error::InvalidSeries(url.to_string()))?;
        let mock = self
            .episodes
            .get(&episode)
            .ok_or_else(|| Error::InvalidSeries(url.to_string()))?;
        if mock.page_delay > 0 {
            tokio::time::sleep(Duration::from_millis(mock.page_delay)).await;
        }

        if mock.broken.contains(&ordinal) {
            Ok(b"<html>not an image</html>".to_vec())
        } else {
            Ok(png_bytes())
        }
    }

    async fn fetch_series_info(&self, _series_id: &str) -> Result<SeriesInfo> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SeriesInfo {
            thumbnail_url: self.thumbnail.then(|| THUMBNAIL_URL.to_string()),
            description: Some("A mock series.".to_string()),
        })
    }
}
