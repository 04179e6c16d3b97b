/// XP4 file header signature: `XP4\r\n \n\x1a\x8b\x67\x01`
pub const XP4_MAGIC: &[u8; 11] = b"XP4\r\n \n\x1a\x8b\x67\x01";
/// First header byte while a volume is still being written.
pub const XP4_MAGIC_PENDING: u8 = 0;
pub const XP4_EXTENSION: &str = "xp4";

/// Position of the little-endian index offset in the header.
pub const INDEX_OFFSET_POS: u64 = 11;
pub const HEADER_SIZE: u64 = 19;
/// Segment bodies and the index block start on this boundary.
pub const ALIGNMENT: u64 = 8;

// Chunk names
pub const CHUNK_ITEM: &[u8; 4] = b"Item";
pub const CHUNK_FILE: &[u8; 4] = b"File";
pub const CHUNK_INFO: &[u8; 4] = b"info";
pub const CHUNK_TIME: &[u8; 4] = b"time";
pub const CHUNK_SEGM_LIST: &[u8; 4] = b"Segm";
pub const CHUNK_SEGM: &[u8; 4] = b"segm";
pub const CHUNK_HASH: &[u8; 4] = b"sha1";
pub const CHUNK_META: &[u8; 4] = b"Meta";
pub const CHUNK_TARG: &[u8; 4] = b"targ";

pub const SEGM_ENTRY_SIZE: usize = 33;
pub const TIME_SIZE: usize = 9;
pub const HASH_SIZE: usize = 20;

// Index entry flags
pub const XP4_INDEX_ENCODE_METHOD_MASK: u8 = 0x07;
pub const XP4_INDEX_ENCODE_RAW: u8 = 0;
pub const XP4_INDEX_ENCODE_ZLIB: u8 = 1;

// Segment entry flags
pub const XP4_SEGM_ENCODE_METHOD_MASK: u8 = 0x07;
pub const XP4_SEGM_ENCODE_RAW: u8 = 0;
pub const XP4_SEGM_ENCODE_ZLIB: u8 = 1;

// File entry flags
pub const XP4_FILE_STATE_MASK: u16 = 0x0003;
pub const XP4_FILE_STATE_NONE: u16 = 0;
pub const XP4_FILE_STATE_ADDED: u16 = 1;
pub const XP4_FILE_STATE_MODIFIED: u16 = 2;
pub const XP4_FILE_STATE_DELETED: u16 = 3;
pub const XP4_FILE_COMPRESSED: u16 = 0x0010;
pub const XP4_FILE_EXCLUDED: u16 = 0x0020;
pub const XP4_FILE_MARKED: u16 = 0x8000;

/// Buffer size used when copying raw file bodies.
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;
