//! Builds, reads and patches XP4 archives.
//!
//! An archive *set* is a base volume `name.xp4`, optional split volumes
//! `name.001.xp4`, and any number of patch generations
//! `name.<generation>.xp4` layered on top of it. See [`xp4::set`] for how the
//! layers are merged and [`xp4::release`] for the driver that decides whether
//! a build writes a new base or a patch.
pub mod error;
pub mod ext;
pub mod types;
pub mod utils;
pub mod xp4;

pub use error::{Error, Result};
