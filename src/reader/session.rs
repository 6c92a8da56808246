use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::downloader::{DownloadEvent, DownloadJob, Downloader};
use crate::backend::position::{PositionMarker, ReadingPosition};
use crate::backend::store::EpisodeStore;
use crate::error::{Boundary, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loaded(u32),
    AwaitingDownload(u32),
    /// Opening an episode failed with nothing on screen to fall back to.
    Error(Boundary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Replace,
    Append,
    Prepend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRef {
    pub episode: u32,
    pub ordinal: u32,
    pub path: PathBuf,
}

/// Pages of one episode spliced into the visible sequence.
///
/// `anchor` is the index in the whole sequence the view should sit on
/// afterwards; `None` leaves the scroll offset alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeLoad {
    pub episode: u32,
    pub placement: Placement,
    pub pages: Vec<PageRef>,
    pub anchor: Option<usize>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    Loaded(EpisodeLoad),
    Downloading(u32),
    /// Dropped because a download is already in flight, or nothing is open.
    Ignored,
}

struct InFlight {
    target: u32,
    placement: Placement,
    fallback: SessionState,
    handle: JoinHandle<Result<Vec<u32>>>,
}

/// Infinite-scroll reader over one series folder.
///
/// Reaching an edge loads the neighbouring episode from disk, or starts a
/// single-episode download for it. At most one download runs per session;
/// edge events that arrive meanwhile are ignored until `settle` resolves it.
pub struct ReadingSession {
    series_id: String,
    store: EpisodeStore,
    marker: PositionMarker,
    downloader: Downloader,
    events: mpsc::UnboundedSender<DownloadEvent>,
    state: SessionState,
    pages: Vec<PageRef>,
    in_flight: Option<InFlight>,
    jobs_submitted: usize,
    persist_error: Option<Error>,
}

impl ReadingSession {
    pub fn new(
        store: EpisodeStore,
        downloader: Downloader,
        events: mpsc::UnboundedSender<DownloadEvent>,
    ) -> Self {
        Self {
            series_id: store.key().id.clone(),
            marker: PositionMarker::new(store.dir()),
            store,
            downloader,
            events,
            state: SessionState::Idle,
            pages: Vec::new(),
            in_flight: None,
            jobs_submitted: 0,
            persist_error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn pages(&self) -> &[PageRef] {
        &self.pages
    }

    pub fn store(&self) -> &EpisodeStore {
        &self.store
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn jobs_submitted(&self) -> usize {
        self.jobs_submitted
    }

    pub fn saved_position(&self) -> Option<ReadingPosition> {
        self.marker.load()
    }

    /// Last marker write failure, if any. Writes are best-effort.
    pub fn take_persist_error(&mut self) -> Option<Error> {
        self.persist_error.take()
    }

    /// Starts reading at `episode`, downloading it first if it is not local.
    pub fn open(&mut self, episode: u32) -> Result<Step> {
        if self.is_busy() {
            return Ok(Step::Ignored);
        }
        if episode == 0 {
            return Err(Error::NavigationBoundary(Boundary::NoPrevious));
        }

        if self.store.exists(episode) {
            self.load(episode, Placement::Replace)
        } else {
            self.submit(episode, Placement::Replace)
        }
    }

    /// Opens the episode stored in the position marker, or episode 1.
    pub fn resume(&mut self) -> Result<Step> {
        let episode = self.saved_position().map(|p| p.episode).unwrap_or(1);
        self.open(episode)
    }

    pub fn scroll_to_bottom(&mut self) -> Result<Step> {
        if self.is_busy() {
            return Ok(Step::Ignored);
        }
        let Some(last) = self.pages.last().map(|p| p.episode) else {
            return Ok(Step::Ignored);
        };

        let next = last + 1;
        if self.store.exists(next) {
            self.load(next, Placement::Append)
        } else {
            self.submit(next, Placement::Append)
        }
    }

    pub fn scroll_to_top(&mut self) -> Result<Step> {
        if self.is_busy() {
            return Ok(Step::Ignored);
        }
        let Some(first) = self.pages.first().map(|p| p.episode) else {
            return Ok(Step::Ignored);
        };

        if first <= 1 {
            return Err(Error::NavigationBoundary(Boundary::NoPrevious));
        }
        let previous = first - 1;
        if self.store.exists(previous) {
            self.load(previous, Placement::Prepend)
        } else {
            self.submit(previous, Placement::Prepend)
        }
    }

    /// Fine-grained position: the page at `index` of the visible sequence
    /// came into view. Returns the position written, or `None` when no
    /// page sits at `index`.
    pub fn record_view(&mut self, index: usize) -> Option<ReadingPosition> {
        let episode = self.pages.get(index)?.episode;
        let within = self.pages[..index]
            .iter()
            .filter(|p| p.episode == episode)
            .count();
        let position = ReadingPosition::new(episode, u32::try_from(within).ok()?);
        self.persist(position);
        Some(position)
    }

    /// Waits for the in-flight download and applies its outcome. Returns
    /// `None` when nothing is in flight.
    ///
    /// Cancel-safe: dropping the future leaves the download in flight.
    pub async fn settle(&mut self) -> Option<Result<Step>> {
        let joined = (&mut self.in_flight.as_mut()?.handle).await;
        let InFlight {
            target,
            placement,
            fallback,
            ..
        } = self.in_flight.take()?;

        let boundary = match placement {
            Placement::Prepend => Boundary::NoPrevious,
            Placement::Append | Placement::Replace => Boundary::NoNext,
        };

        match joined {
            Ok(Ok(_)) if self.store.exists(target) => return Some(self.load(target, placement)),
            Ok(Ok(_)) => log::info!("episode {} has no pages", target),
            Ok(Err(e)) => log::info!("episode {} unavailable: {}", target, e),
            Err(e) => log::error!("download task for episode {} failed: {}", target, e),
        }

        self.state = match fallback {
            SessionState::Loaded(episode) => SessionState::Loaded(episode),
            _ => SessionState::Error(boundary),
        };
        Some(Err(Error::NavigationBoundary(boundary)))
    }

    fn submit(&mut self, episode: u32, placement: Placement) -> Result<Step> {
        let job = DownloadJob::single(
            &self.series_id,
            &self.store.key().title,
            episode,
            self.store.dir().parent().unwrap_or(self.store.dir()),
        )?;

        let downloader = self.downloader.clone();
        let events = self.events.clone();
        let handle = tokio::spawn(async move { downloader.download(&job, &events).await });

        log::debug!("fetching episode {} ({:?})", episode, placement);
        self.jobs_submitted += 1;
        self.in_flight = Some(InFlight {
            target: episode,
            placement,
            fallback: self.state,
            handle,
        });
        self.state = SessionState::AwaitingDownload(episode);
        Ok(Step::Downloading(episode))
    }

    fn load(&mut self, episode: u32, placement: Placement) -> Result<Step> {
        let pages: Vec<PageRef> = self
            .store
            .episode_pages(episode)
            .into_iter()
            .map(|(ordinal, path)| PageRef {
                episode,
                ordinal,
                path,
            })
            .collect();

        if pages.is_empty() {
            let boundary = if placement == Placement::Prepend {
                Boundary::NoPrevious
            } else {
                Boundary::NoNext
            };
            return Err(Error::NavigationBoundary(boundary));
        }

        let anchor = match placement {
            Placement::Replace => {
                let saved = self
                    .saved_position()
                    .filter(|p| p.episode == episode)
                    .map(|p| p.ordinal as usize)
                    .unwrap_or(0);
                self.pages = pages.clone();
                Some(saved.min(pages.len() - 1))
            }
            Placement::Append => {
                self.pages.extend(pages.iter().cloned());
                None
            }
            Placement::Prepend => {
                let shift = pages.len();
                self.pages.splice(0..0, pages.iter().cloned());
                Some(shift)
            }
        };

        self.state = SessionState::Loaded(episode);
        self.persist(ReadingPosition::new(episode, 0));

        Ok(Step::Loaded(EpisodeLoad {
            episode,
            placement,
            pages,
            anchor,
        }))
    }

    fn persist(&mut self, position: ReadingPosition) {
        if let Err(e) = self.marker.save(position) {
            log::warn!("could not save reading position: {}", e);
            self.persist_error = Some(e);
        }
    }
}
