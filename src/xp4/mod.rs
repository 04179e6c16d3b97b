//! XP4 archive engine.
pub mod archive;
pub mod chunk;
pub mod classify;
pub mod consts;
pub mod diff;
pub mod hash;
pub mod reader;
pub mod release;
pub mod segmenter;
pub mod set;
pub mod writer;
