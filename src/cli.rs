use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "webtoon-shelf",
    version,
    about = "Save webcomic episodes as page images and read them offline.",
    long_about = None
)]
pub struct Cli {
    /// Library folder holding one `{title}_{id}` folder per series
    #[clap(short, long, value_name = "DIR", global = true)]
    pub library: Option<PathBuf>,

    /// Episodes downloaded in parallel (default: half the logical CPUs)
    #[clap(short, long, global = true)]
    pub workers: Option<usize>,

    /// Increase verbosity (-v, -vv)
    #[clap(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download an episode range
    Download {
        /// Series id, or an episode URL (`...?titleId=ID&no=N`)
        series: String,
        /// First episode (defaults to the episode in the URL)
        start: Option<u32>,
        /// Last episode (defaults to START)
        end: Option<u32>,
        /// Series title; looked up from episode 1 when omitted
        #[clap(short, long)]
        title: Option<String>,
    },
    /// List saved series
    Library {
        /// Only show series whose title contains this keyword
        #[clap(short, long)]
        filter: Option<String>,
    },
    /// Read a saved series; episodes missing locally are downloaded
    Read {
        /// Series folder name or id
        series: String,
        /// Start at this episode
        #[clap(short, long, conflicts_with = "resume")]
        episode: Option<u32>,
        /// Continue from the last read episode
        #[clap(short, long)]
        resume: bool,
    },
    /// Delete a saved series
    Remove {
        /// Series folder name or id
        series: String,
        /// Actually delete
        #[clap(long)]
        yes: bool,
    },
    /// Show or save the effective settings
    Settings {
        #[clap(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum SettingsAction {
    Show,
    Save,
}
