use super::consts::*;
use super::hash::ContentHash;
use crate::error::{Error, Result};
use crate::types::FileState;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use std::path::PathBuf;

/// Represents a single data segment for a file.
/// A file can be split into multiple segments, which can be compressed independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Segment {
    pub is_compressed: bool,
    /// The offset of this segment within the original, uncompressed file.
    pub offset_in_file: u64,
    /// The size of the segment after decompression.
    pub original_size: u64,
    /// The offset of the segment's data within the volume file.
    pub start: u64,
    /// The size of the segment in the volume (potentially compressed).
    pub archived_size: u64,
}

impl Segment {
    pub fn flags(&self) -> u8 {
        if self.is_compressed {
            XP4_SEGM_ENCODE_ZLIB
        } else {
            XP4_SEGM_ENCODE_RAW
        }
    }
}

/// One logical path inside an archive generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Storage name with a leading `/`.
    pub name: String,
    pub flags: u16,
    /// Modification time in UTC. Absent for deleted records.
    pub time: Option<NaiveDateTime>,
    /// Logical size, the sum of the segments' original sizes.
    pub size: u64,
    /// Absent for deleted records.
    pub hash: Option<ContentHash>,
    pub segments: Vec<Segment>,
}

impl FileRecord {
    pub fn new(name: impl Into<String>, flags: u16, time: Option<NaiveDateTime>, size: u64) -> Self {
        Self {
            name: name.into(),
            flags,
            time,
            size,
            hash: None,
            segments: Vec::new(),
        }
    }

    /// A tombstone removing `name` from the merged view.
    pub fn deleted(name: impl Into<String>) -> Self {
        Self::new(name, XP4_FILE_STATE_DELETED, None, 0)
    }

    pub fn state(&self) -> FileState {
        match self.flags & XP4_FILE_STATE_MASK {
            XP4_FILE_STATE_ADDED => FileState::Added,
            XP4_FILE_STATE_MODIFIED => FileState::Modified,
            XP4_FILE_STATE_DELETED => FileState::Deleted,
            _ => FileState::None,
        }
    }

    pub fn set_state(&mut self, state: FileState) {
        let bits = match state {
            FileState::None => XP4_FILE_STATE_NONE,
            FileState::Added => XP4_FILE_STATE_ADDED,
            FileState::Modified => XP4_FILE_STATE_MODIFIED,
            FileState::Deleted => XP4_FILE_STATE_DELETED,
        };
        self.flags = (self.flags & !XP4_FILE_STATE_MASK) | bits;
    }

    pub fn is_deleted(&self) -> bool {
        self.state() == FileState::Deleted
    }

    /// Whether the classification asked for this file to be compressed.
    pub fn is_compress_hint(&self) -> bool {
        self.flags & XP4_FILE_COMPRESSED != 0
    }

    pub fn is_marked(&self) -> bool {
        self.flags & XP4_FILE_MARKED != 0
    }

    pub fn set_marked(&mut self, marked: bool) {
        if marked {
            self.flags |= XP4_FILE_MARKED;
        } else {
            self.flags &= !XP4_FILE_MARKED;
        }
    }

    /// Bytes this record occupies inside its volume.
    pub fn archived_size(&self) -> u64 {
        self.segments.iter().map(|s| s.archived_size).sum()
    }

    /// Flags as they are written to disk: transient bits stripped.
    pub fn stored_flags(&self) -> u16 {
        self.flags & !(XP4_FILE_MARKED | XP4_FILE_EXCLUDED)
    }
}

/// Where the writer reads the content of an input file from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Deleted records carry no content.
    None,
    /// A file on the local file system.
    File(PathBuf),
    /// Segments already stored in an existing volume.
    Volume {
        path: PathBuf,
        segments: Vec<Segment>,
    },
}

/// One entry handed to the archive writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub record: FileRecord,
    pub source: InputSource,
}

impl InputFile {
    pub fn deleted(name: impl Into<String>) -> Self {
        Self {
            record: FileRecord::deleted(name),
            source: InputSource::None,
        }
    }
}

/// Encodes `time` as the 9-byte `time` chunk content.
pub fn encode_time(time: &NaiveDateTime) -> [u8; TIME_SIZE] {
    let mut out = [0u8; TIME_SIZE];
    let year = time.year().clamp(0, u16::MAX as i32) as u16;
    let millis = (time.nanosecond() / 1_000_000).min(999) as u16;
    out[0..2].copy_from_slice(&year.to_le_bytes());
    out[2] = time.month0() as u8;
    out[3] = time.day() as u8;
    out[4] = time.hour() as u8;
    out[5] = time.minute() as u8;
    out[6] = time.second() as u8;
    out[7..9].copy_from_slice(&millis.to_le_bytes());
    out
}

/// Decodes a `time` chunk. A month outside 0..12 falls back to January.
pub fn decode_time(data: &[u8]) -> Result<NaiveDateTime> {
    if data.len() < TIME_SIZE {
        return Err(Error::corrupt(format!(
            "time chunk has {} bytes, expected {}",
            data.len(),
            TIME_SIZE
        )));
    }
    let year = u16::from_le_bytes([data[0], data[1]]) as i32;
    let month = if data[2] < 12 { data[2] as u32 + 1 } else { 1 };
    let millis = u16::from_le_bytes([data[7], data[8]]) as u32;
    NaiveDate::from_ymd_opt(year, month, data[3] as u32)
        .and_then(|d| d.and_hms_milli_opt(data[4] as u32, data[5] as u32, data[6] as u32, millis))
        .ok_or_else(|| Error::corrupt("invalid date in time chunk"))
}
