use serde::{Deserialize, Serialize};

/// Uncompressed size of one compressed segment.
pub const DEFAULT_COMPRESS_UNIT: u64 = 256 * 1024;

#[derive(Clone, Debug)]
/// Options for a single archive build session.
pub struct BuildConfig {
    /// Upper bound for the size of one volume file in bytes. 0 disables splitting.
    pub volume_size_limit: u64,
    /// Whether the index block is zlib-compressed.
    pub compress_index: bool,
    /// zlib compression level used for segments and the index.
    pub zlib_compression_level: u32,
    /// Files flagged compressible are cut into slices of this many bytes and
    /// each slice is compressed independently.
    pub compress_unit: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            volume_size_limit: 0,
            compress_index: true,
            zlib_compression_level: 6,
            compress_unit: DEFAULT_COMPRESS_UNIT,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// State of a file record inside one generation.
pub enum FileState {
    /// Plain record of a base archive or a merged set.
    None,
    /// The path did not exist in the previous generations.
    Added,
    /// The content of the path changed since the previous generations.
    Modified,
    /// The path was removed since the previous generations.
    Deleted,
}

impl FileState {
    /// One-letter tag used by the change list.
    pub fn tag(&self) -> &'static str {
        match self {
            FileState::None => " ",
            FileState::Added => "A",
            FileState::Modified => "M",
            FileState::Deleted => "D",
        }
    }
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FileState::None => "none",
            FileState::Added => "added",
            FileState::Modified => "modified",
            FileState::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
/// One line of the change list produced by a build session.
pub struct Change {
    pub path: String,
    pub state: FileState,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
/// Which kind of volume a build session produced.
pub enum Generation {
    /// A fresh base archive.
    Base,
    /// A patch generation with its identifier.
    Patch(String),
}
