use async_trait::async_trait;

use crate::error::Result;

/// What an episode page yields: its title marker and the page images in
/// display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeListing {
    pub title: String,
    pub page_urls: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesInfo {
    pub thumbnail_url: Option<String>,
    pub description: Option<String>,
}

/// Remote document source for a webcomic site.
///
/// `fetch_episode` returns `Ok(None)` when the markup has no title marker.
/// A listing with no page URLs is also an empty episode to the downloader.
#[async_trait]
pub trait ComicSource: Send + Sync {
    async fn fetch_episode(&self, series_id: &str, episode: u32) -> Result<Option<EpisodeListing>>;

    async fn fetch_page(&self, url: &str) -> Result<Vec<u8>>;

    async fn fetch_series_info(&self, series_id: &str) -> Result<SeriesInfo>;

    /// Looks up the series title by extracting its first episode.
    async fn lookup_title(&self, series_id: &str) -> Result<Option<String>> {
        Ok(self
            .fetch_episode(series_id, 1)
            .await?
            .map(|listing| listing.title))
    }
}
