mod cli;

use clap::Parser;
use cli::{Cli, Command, SettingsAction};
use std::error::Error;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use webtoon_shelf::backend::downloader::{DownloadEvent, DownloadJob, Downloader};
use webtoon_shelf::backend::library::Library;
use webtoon_shelf::backend::naver::{NaverSource, parse_episode_url};
use webtoon_shelf::backend::source::ComicSource;
use webtoon_shelf::config::Settings;
use webtoon_shelf::reader::{ReadingSession, Step};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut settings = Settings::load();
    if let Some(dir) = cli.library {
        settings.library_dir = dir;
    }
    if let Some(workers) = cli.workers {
        settings.workers = Some(workers);
    }

    match cli.command {
        Command::Download {
            series,
            start,
            end,
            title,
        } => download(&settings, &series, start, end, title).await?,
        Command::Library { filter } => list_library(&settings, filter.as_deref())?,
        Command::Read {
            series,
            episode,
            resume,
        } => read(&settings, &series, episode, resume).await?,
        Command::Remove { series, yes } => remove(&settings, &series, yes)?,
        Command::Settings { action } => match action {
            SettingsAction::Show => println!("{}", serde_json::to_string_pretty(&settings)?),
            SettingsAction::Save => println!("saved {}", settings.save()?.display()),
        },
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn downloader(settings: &Settings) -> Result<Downloader, Box<dyn Error>> {
    let source: Arc<dyn ComicSource> = Arc::new(NaverSource::new(settings)?);
    Ok(Downloader::new(source, settings.worker_count()))
}

fn spawn_progress_printer(mut rx: mpsc::UnboundedReceiver<DownloadEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event.percent() {
                Some(percent) => println!("  {} [{}%]", event.message(), percent),
                None => println!("  {}", event.message()),
            }
        }
    })
}

async fn download(
    settings: &Settings,
    series: &str,
    start: Option<u32>,
    end: Option<u32>,
    title: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let (series_id, start) = match (parse_episode_url(series), start) {
        (Some((id, _)), Some(start)) => (id, start),
        (Some((id, episode)), None) => (id, episode),
        (None, Some(start)) => (series.to_string(), start),
        (None, None) => return Err("give a start episode or an episode URL".into()),
    };
    let end = end.unwrap_or(start);

    let downloader = downloader(settings)?;
    let title = match title {
        Some(title) => title,
        None => downloader
            .source()
            .lookup_title(&series_id)
            .await?
            .ok_or_else(|| format!("no title found for series {}", series_id))?,
    };

    let job = DownloadJob::new(&series_id, &title, start, end, &settings.library_dir)?;
    println!("{} [{}]: episodes {}-{}", title, series_id, start, end);

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = spawn_progress_printer(rx);
    let result = downloader.download(&job, &tx).await;
    drop(tx);
    printer.await?;

    let episodes = result?;
    if episodes.is_empty() {
        println!("no episodes were downloaded");
    } else {
        let list: Vec<String> = episodes.iter().map(u32::to_string).collect();
        println!("downloaded episodes: {}", list.join(", "));
    }
    Ok(())
}

fn list_library(settings: &Settings, filter: Option<&str>) -> Result<(), Box<dyn Error>> {
    let library = Library::new(&settings.library_dir);
    let entries = match filter {
        Some(keyword) => library.filter(keyword)?,
        None => library.scan()?,
    };

    if entries.is_empty() {
        println!("no saved series in {}", library.root().display());
    }
    for entry in entries {
        println!("{}", entry.summary());
    }
    Ok(())
}

fn remove(settings: &Settings, series: &str, yes: bool) -> Result<(), Box<dyn Error>> {
    let library = Library::new(&settings.library_dir);
    let entry = library.find(series)?;
    if !yes {
        println!("would delete {}; pass --yes to confirm", entry.dir.display());
        return Ok(());
    }
    library.remove(&entry)?;
    println!("deleted {}", entry.dir.display());
    Ok(())
}

fn report(step: webtoon_shelf::Result<Step>) -> Result<(), Box<dyn Error>> {
    match step {
        Ok(Step::Loaded(load)) => {
            println!(
                "episode {} ({:?}, {} pages)",
                load.episode,
                load.placement,
                load.pages.len()
            );
            for page in &load.pages {
                println!("  {}", page.path.display());
            }
            if let Some(anchor) = load.anchor {
                println!("  -> page index {}", anchor);
            }
        }
        Ok(Step::Downloading(episode)) => println!("fetching episode {}...", episode),
        Ok(Step::Ignored) => println!("busy, still fetching"),
        Err(webtoon_shelf::Error::NavigationBoundary(boundary)) => println!("{}", boundary),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn read(
    settings: &Settings,
    series: &str,
    episode: Option<u32>,
    resume: bool,
) -> Result<(), Box<dyn Error>> {
    let entry = Library::new(&settings.library_dir).find(series)?;
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = spawn_progress_printer(rx);
    let mut session = ReadingSession::new(entry.store(), downloader(settings)?, tx);

    let first = match (episode, resume) {
        (Some(episode), _) => session.open(episode),
        (None, true) => session.resume(),
        (None, false) => session.open(1),
    };
    report(first)?;
    println!("commands: n (next), p (previous), v <index> (page in view, counted across the loaded pages), q (quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Some(outcome) = session.settle(), if session.is_busy() => report(outcome)?,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let mut words = line.split_whitespace();
                match words.next() {
                    Some("n") => report(session.scroll_to_bottom())?,
                    Some("p") => report(session.scroll_to_top())?,
                    Some("v") => match words.next().and_then(|w| w.parse::<usize>().ok()) {
                        Some(index) => match session.record_view(index) {
                            Some(position) => println!("at {}", position),
                            None => println!("no page at index {}", index),
                        },
                        None => println!("usage: v <index>"),
                    },
                    Some("q") => break,
                    Some(other) => println!("unknown command {}", other),
                    None => {}
                }
            }
        }
    }

    drop(session);
    printer.await?;
    Ok(())
}
