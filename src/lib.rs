//! Download webcomic episodes as numbered page images and read them back
//! offline, fetching missing episodes while you scroll.

pub mod backend;
pub mod config;
pub mod error;
pub mod reader;

pub use error::{Boundary, Error, FailureKind, Result};
