//! Extensions for other crates.
pub mod io;
