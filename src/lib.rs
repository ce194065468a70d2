//! Replace playlist tracks on a Plex Media Server with better versions of the
//! same songs from the same library.

pub mod auth;
pub mod config;
pub mod error;
pub mod matching;
pub mod quality;
pub mod reconcile;
pub mod report;
pub mod service;
pub mod spotdl;
pub mod upgrade;

pub use error::{Error, Result};
