use futures::stream::{self, StreamExt};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

use super::source::ComicSource;
use super::store::{EpisodeStore, SeriesKey};
use crate::error::{Error, Result};

/// One invocation of the downloader over an inclusive episode range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub series_id: String,
    pub title: String,
    pub start: u32,
    pub end: u32,
    pub library_root: PathBuf,
}

impl DownloadJob {
    pub fn new(
        series_id: &str,
        title: &str,
        start: u32,
        end: u32,
        library_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        if start == 0 || start > end {
            return Err(Error::InvalidRange { start, end });
        }
        Ok(Self {
            series_id: series_id.to_string(),
            title: title.to_string(),
            start,
            end,
            library_root: library_root.into(),
        })
    }

    pub fn single(series_id: &str, title: &str, episode: u32, library_root: impl Into<PathBuf>) -> Result<Self> {
        Self::new(series_id, title, episode, episode, library_root)
    }

    pub fn store(&self) -> EpisodeStore {
        EpisodeStore::new(&self.library_root, SeriesKey::new(&self.title, &self.series_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeDownloadResult {
    pub episode: u32,
    pub images_written: usize,
}

#[derive(Debug)]
pub enum DownloadEvent {
    AlreadyStored { episode: u32 },
    EpisodeStarted { episode: u32, pages: usize },
    EpisodeFinished { episode: u32, written: usize },
    Progress { written: usize, discovered: usize, percent: u8 },
    /// A page or episode failure that was skipped without failing the job.
    Contained(Error),
    Finished { episodes: Vec<u32> },
}

impl DownloadEvent {
    pub fn message(&self) -> String {
        match self {
            DownloadEvent::AlreadyStored { episode } => {
                format!("episode {} already downloaded", episode)
            }
            DownloadEvent::EpisodeStarted { episode, pages } => {
                format!("episode {}: downloading {} images", episode, pages)
            }
            DownloadEvent::EpisodeFinished { episode, written } => {
                format!("episode {} done: {} images", episode, written)
            }
            DownloadEvent::Progress {
                written,
                discovered,
                percent,
            } => format!("Progress: {}/{} ({}%)", written, discovered, percent),
            DownloadEvent::Contained(err) => err.to_string(),
            DownloadEvent::Finished { .. } => "download complete".to_string(),
        }
    }

    pub fn percent(&self) -> Option<u8> {
        match self {
            DownloadEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        }
    }
}

/// Image totals shared by every episode worker of one job.
#[derive(Debug, Default)]
struct JobCounters {
    discovered: AtomicUsize,
    written: AtomicUsize,
}

impl JobCounters {
    fn snapshot(&self) -> (usize, usize) {
        (
            self.written.load(Ordering::SeqCst),
            self.discovered.load(Ordering::SeqCst),
        )
    }
}

fn contain(events: &mpsc::UnboundedSender<DownloadEvent>, err: Error) {
    log::warn!("skipped: {}", err);
    let _ = events.send(DownloadEvent::Contained(err));
}

#[derive(Clone)]
pub struct Downloader {
    source: Arc<dyn ComicSource>,
    workers: usize,
}

impl Downloader {
    pub fn new(source: Arc<dyn ComicSource>, workers: usize) -> Self {
        Self {
            source,
            workers: workers.max(1),
        }
    }

    pub fn source(&self) -> &Arc<dyn ComicSource> {
        &self.source
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Downloads every episode of `job` that has no page on disk yet.
    ///
    /// Returns the episodes that got at least one image, ascending. Fails
    /// with `JobAborted` when an episode finishes while the job has still
    /// not discovered a single image.
    pub async fn download(
        &self,
        job: &DownloadJob,
        events: &mpsc::UnboundedSender<DownloadEvent>,
    ) -> Result<Vec<u32>> {
        if job.start == 0 || job.start > job.end {
            return Err(Error::InvalidRange {
                start: job.start,
                end: job.end,
            });
        }

        let store = job.store();
        store.ensure_dir()?;

        let pending: Vec<u32> = (job.start..=job.end)
            .filter(|&episode| {
                if store.exists(episode) {
                    log::debug!("episode {} already on disk", episode);
                    let _ = events.send(DownloadEvent::AlreadyStored { episode });
                    false
                } else {
                    true
                }
            })
            .collect();

        log::info!(
            "{}: {} of {} episodes to fetch with {} workers",
            store.key().folder_name(),
            pending.len(),
            job.end - job.start + 1,
            self.workers
        );

        if pending.is_empty() {
            let _ = events.send(DownloadEvent::Finished {
                episodes: Vec::new(),
            });
            return Ok(Vec::new());
        }
        self.save_thumbnail(job, &store, events).await;

        let counters = JobCounters::default();
        let mut completed = Vec::new();
        let mut last_percent = 0u8;

        {
            let workers: Vec<_> = pending
                .into_iter()
                .map(|episode| {
                    self.download_episode(&job.series_id, episode, &store, &counters, events)
                })
                .collect();
            let mut results = stream::iter(workers).buffer_unordered(self.workers);

            while let Some(result) = results.next().await {
                let (written, discovered) = counters.snapshot();
                if discovered == 0 {
                    log::error!(
                        "{}: nothing downloadable in episodes {}-{}",
                        store.key().folder_name(),
                        job.start,
                        job.end
                    );
                    return Err(Error::JobAborted {
                        start: job.start,
                        end: job.end,
                    });
                }

                let _ = events.send(DownloadEvent::EpisodeFinished {
                    episode: result.episode,
                    written: result.images_written,
                });

                let percent = ((written * 100 / discovered).min(100) as u8).max(last_percent);
                last_percent = percent;
                let _ = events.send(DownloadEvent::Progress {
                    written,
                    discovered,
                    percent,
                });

                if result.images_written > 0 {
                    completed.push(result.episode);
                }
            }
        }

        completed.sort_unstable();
        let _ = events.send(DownloadEvent::Finished {
            episodes: completed.clone(),
        });
        Ok(completed)
    }

    async fn download_episode(
        &self,
        series_id: &str,
        episode: u32,
        store: &EpisodeStore,
        counters: &JobCounters,
        events: &mpsc::UnboundedSender<DownloadEvent>,
    ) -> EpisodeDownloadResult {
        let empty = EpisodeDownloadResult {
            episode,
            images_written: 0,
        };

        let listing = match self.source.fetch_episode(series_id, episode).await {
            Ok(Some(listing)) if !listing.page_urls.is_empty() => listing,
            Ok(Some(_)) => {
                contain(
                    events,
                    Error::EpisodeExtraction {
                        episode,
                        reason: "no page images".to_string(),
                    },
                );
                return empty;
            }
            Ok(None) => {
                contain(
                    events,
                    Error::EpisodeExtraction {
                        episode,
                        reason: "no title marker".to_string(),
                    },
                );
                return empty;
            }
            Err(e) => {
                contain(
                    events,
                    Error::EpisodeExtraction {
                        episode,
                        reason: e.to_string(),
                    },
                );
                return empty;
            }
        };

        let pages = listing.page_urls.len();
        counters.discovered.fetch_add(pages, Ordering::SeqCst);
        let _ = events.send(DownloadEvent::EpisodeStarted { episode, pages });

        let mut images_written = 0;
        for (index, url) in listing.page_urls.iter().enumerate() {
            let ordinal = index as u32 + 1;

            let bytes = match self.source.fetch_page(url).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    contain(
                        events,
                        Error::PageDecode {
                            episode,
                            ordinal,
                            reason: e.to_string(),
                        },
                    );
                    continue;
                }
            };

            let page_store = store.clone();
            let saved = tokio::task::spawn_blocking(move || {
                save_page(&page_store, episode, ordinal, &bytes)
            })
            .await;

            match saved {
                Ok(Ok(_)) => {
                    images_written += 1;
                    counters.written.fetch_add(1, Ordering::SeqCst);
                }
                Ok(Err(e)) => contain(events, e),
                Err(e) => contain(
                    events,
                    Error::PageDecode {
                        episode,
                        ordinal,
                        reason: e.to_string(),
                    },
                ),
            }
        }

        log::debug!("episode {}: {}/{} pages written", episode, images_written, pages);
        EpisodeDownloadResult {
            episode,
            images_written,
        }
    }

    async fn save_thumbnail(
        &self,
        job: &DownloadJob,
        store: &EpisodeStore,
        events: &mpsc::UnboundedSender<DownloadEvent>,
    ) {
        if store.has_thumbnail() {
            return;
        }

        let url = match self.source.fetch_series_info(&job.series_id).await {
            Ok(info) => match info.thumbnail_url {
                Some(url) => url,
                None => return,
            },
            Err(e) => {
                log::debug!("no series info for {}: {}", job.series_id, e);
                return;
            }
        };

        match self.source.fetch_page(&url).await {
            Ok(bytes) => {
                if let Err(e) = store.write_thumbnail(&bytes) {
                    contain(events, e);
                }
            }
            Err(e) => log::debug!("thumbnail {} failed: {}", url, e),
        }
    }
}

/// Decodes fetched bytes and stores them re-encoded as JPEG.
fn save_page(store: &EpisodeStore, episode: u32, ordinal: u32, bytes: &[u8]) -> Result<PathBuf> {
    let decode_error = |reason: String| Error::PageDecode {
        episode,
        ordinal,
        reason,
    };

    let image = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| decode_error(e.to_string()))?
        .decode()
        .map_err(|e| decode_error(e.to_string()))?;

    let mut encoded = Vec::new();
    DynamicImage::ImageRgb8(image.to_rgb8())
        .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Jpeg)
        .map_err(|e| decode_error(e.to_string()))?;

    store.write(&store.page_filename(episode, ordinal), &encoded)
}
