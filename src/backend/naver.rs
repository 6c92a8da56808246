use async_trait::async_trait;
use reqwest::Url;
use scraper::{Html, Selector};
use std::sync::LazyLock;

use super::source::{ComicSource, EpisodeListing, SeriesInfo};
use crate::config::Settings;
use crate::error::Result;

const IMAGE_HOST_MARKER: &str = "image-comic.pstatic.net/webtoon/";
const PAGE_IMAGE_MARKER: &str = "IMAG01";

/// Naver Webtoon episode and series pages, scraped from HTML.
#[derive(Clone)]
pub struct NaverSource {
    client: reqwest::Client,
    base_url: String,
}

impl NaverSource {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn episode_url(&self, series_id: &str, episode: u32) -> String {
        format!(
            "{}/webtoon/detail?titleId={}&no={}",
            self.base_url,
            urlencoding::encode(series_id),
            episode
        )
    }

    fn series_url(&self, series_id: &str) -> String {
        format!(
            "{}/webtoon/list?titleId={}",
            self.base_url,
            urlencoding::encode(series_id)
        )
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl ComicSource for NaverSource {
    async fn fetch_episode(&self, series_id: &str, episode: u32) -> Result<Option<EpisodeListing>> {
        let url = self.episode_url(series_id, episode);
        log::debug!("fetching episode page {}", url);
        let html = self.get_text(&url).await?;
        Ok(parse_episode_html(&html))
    }

    async fn fetch_page(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn fetch_series_info(&self, series_id: &str) -> Result<SeriesInfo> {
        let html = self.get_text(&self.series_url(series_id)).await?;
        Ok(parse_series_html(&html))
    }
}

static TITLE: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("a.title").ok());
static IMAGES: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("img[src]").ok());
static OG_IMAGE: LazyLock<Option<Selector>> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:image"]"#).ok());
static OG_DESCRIPTION: LazyLock<Option<Selector>> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:description"]"#).ok());

/// Pulls the title marker and page-image URLs out of an episode page.
pub fn parse_episode_html(html: &str) -> Option<EpisodeListing> {
    let (title_sel, images_sel) = (
        LazyLock::force(&TITLE).as_ref()?,
        LazyLock::force(&IMAGES).as_ref()?,
    );
    let document = Html::parse_document(html);

    let title = document
        .select(title_sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())?;

    let page_urls = document
        .select(images_sel)
        .filter_map(|img| img.value().attr("src"))
        .filter(|src| src.contains(IMAGE_HOST_MARKER) && src.contains(PAGE_IMAGE_MARKER))
        .map(str::to_string)
        .collect();

    Some(EpisodeListing { title, page_urls })
}

pub fn parse_series_html(html: &str) -> SeriesInfo {
    let document = Html::parse_document(html);
    let meta = |sel: &LazyLock<Option<Selector>>| {
        document
            .select(LazyLock::force(sel).as_ref()?)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
    };

    SeriesInfo {
        thumbnail_url: meta(&OG_IMAGE),
        description: meta(&OG_DESCRIPTION),
    }
}

/// Extracts `(series id, episode)` from a viewer URL such as
/// `https://comic.naver.com/webtoon/detail?titleId=183559&no=12`.
pub fn parse_episode_url(url: &str) -> Option<(String, u32)> {
    let url = Url::parse(url).ok()?;
    let mut series_id = None;
    let mut episode = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "titleId" => series_id = Some(value.into_owned()),
            "no" => episode = value.parse::<u32>().ok(),
            _ => {}
        }
    }

    match (series_id, episode) {
        (Some(id), Some(no)) if !id.is_empty() && no > 0 => Some((id, no)),
        _ => None,
    }
}
