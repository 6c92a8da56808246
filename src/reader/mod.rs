pub mod session;

pub use session::{EpisodeLoad, PageRef, Placement, ReadingSession, SessionState, Step};
