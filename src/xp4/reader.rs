use super::archive::*;
use super::chunk::*;
use super::consts::*;
use super::hash::{ContentHash, HashingReader};
use crate::error::{Error, Result};
use crate::ext::io::*;
use flate2::read::ZlibDecoder;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Size of the fixed part of the index block: flags, count, raw and compressed size.
const INDEX_HEADER_SIZE: u64 = 13;

/// Everything stored in the index of one volume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedIndex {
    pub files: Vec<FileRecord>,
    /// Source directory recorded by the build that wrote the volume.
    pub target_dir: Option<String>,
}

/// The metadata of one volume.
#[derive(Debug)]
pub struct Xp4Archive {
    path: PathBuf,
    index: ParsedIndex,
    approx_file_count: u32,
}

impl Xp4Archive {
    /// Reads the header and the index of the volume at `path`.
    pub fn open<P: AsRef<Path> + ?Sized>(path: &P) -> Result<Self> {
        let path = path.as_ref();
        Self::open_inner(path).map_err(|e| e.in_volume(path))
    }

    fn open_inner(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len < HEADER_SIZE {
            return Err(Error::NotAnArchive(path.to_path_buf()));
        }
        let mut reader = BufReader::new(file);
        let mut magic = [0u8; XP4_MAGIC.len()];
        reader.read_exact(&mut magic)?;
        if &magic != XP4_MAGIC {
            return Err(Error::NotAnArchive(path.to_path_buf()));
        }
        let index_offset = reader.read_u64()?;
        let (raw, approx_file_count) = read_index_block(&mut reader, index_offset, len)?;
        let index = parse_index(&raw)?;
        check_extents(&index.files, index_offset)?;
        tracing::debug!(
            "Read {} records from '{}'",
            index.files.len(),
            path.display()
        );
        Ok(Self {
            path: path.to_path_buf(),
            index,
            approx_file_count,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.index.files
    }

    pub fn into_files(self) -> Vec<FileRecord> {
        self.index.files
    }

    pub fn into_index(self) -> ParsedIndex {
        self.index
    }

    pub fn target_dir(&self) -> Option<&str> {
        self.index.target_dir.as_deref()
    }

    /// File count as recorded in the index header.
    pub fn approx_file_count(&self) -> u32 {
        self.approx_file_count
    }

    pub fn find(&self, name: &str) -> Option<&FileRecord> {
        self.index.files.iter().find(|f| f.name == name)
    }

    /// Reads and verifies the content of `record`, which must belong to this volume.
    pub fn read_file(&self, record: &FileRecord) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        extract_record(&self.path, record, &mut data)?;
        Ok(data)
    }
}

/// Reads the index block at `offset` and returns its decoded payload and the
/// recorded file count.
pub fn read_index_block<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    volume_len: u64,
) -> Result<(Vec<u8>, u32)> {
    if offset
        .checked_add(INDEX_HEADER_SIZE)
        .is_none_or(|end| end > volume_len)
    {
        return Err(Error::corrupt(format!(
            "index offset {} lies beyond the end of the volume ({} bytes)",
            offset, volume_len
        )));
    }
    reader.seek(SeekFrom::Start(offset))?;
    let flags = reader.read_u8()?;
    let count = reader.read_u32()?;
    let raw_size = reader.read_u32()? as usize;
    let compressed_size = reader.read_u32()? as u64;
    if offset + INDEX_HEADER_SIZE + compressed_size > volume_len {
        return Err(Error::corrupt(format!(
            "index block declares {} bytes but the volume ends after {}",
            compressed_size,
            volume_len - offset - INDEX_HEADER_SIZE
        )));
    }
    let stored = reader.read_exact_vec(compressed_size as usize)?;
    let data = match flags & XP4_INDEX_ENCODE_METHOD_MASK {
        XP4_INDEX_ENCODE_ZLIB => {
            let mut data = Vec::new();
            ZlibDecoder::new(&stored[..])
                .take(raw_size as u64 + 1)
                .read_to_end(&mut data)
                .map_err(|e| Error::DecompressionFailed(format!("index: {}", e)))?;
            data
        }
        XP4_INDEX_ENCODE_RAW => stored,
        method => {
            return Err(Error::corrupt(format!(
                "unknown index encode method {}",
                method
            )));
        }
    };
    if data.len() != raw_size {
        return Err(Error::corrupt(format!(
            "index holds {} bytes, expected {}",
            data.len(),
            raw_size
        )));
    }
    Ok((data, count))
}

/// Parses a decoded index payload.
pub fn parse_index(data: &[u8]) -> Result<ParsedIndex> {
    let item = find_chunk_content(CHUNK_ITEM, data)?
        .ok_or_else(|| Error::corrupt("missing 'Item' chunk in index"))?;
    let mut files = Vec::new();
    for chunk in Chunks::new(item.content) {
        let chunk = chunk?;
        if &chunk.tag == CHUNK_FILE {
            files.push(parse_file_record(chunk.content)?);
        }
    }
    let mut target_dir = None;
    if let Some(meta) = find_chunk_content(CHUNK_META, data)? {
        if let Some(targ) = find_chunk_content(CHUNK_TARG, meta.content)? {
            target_dir = Some(decode_cstr(targ.content, "targ")?);
        }
    }
    Ok(ParsedIndex { files, target_dir })
}

/// Parses the content of one `File` chunk.
pub fn parse_file_record(data: &[u8]) -> Result<FileRecord> {
    let info = find_chunk_content(CHUNK_INFO, data)?
        .ok_or_else(|| Error::corrupt("missing 'info' chunk in file record"))?
        .content;
    if info.len() < 2 {
        return Err(Error::corrupt("info chunk is too short"));
    }
    let flags = u16::from_le_bytes([info[0], info[1]]) & !XP4_FILE_MARKED;
    let name = format!("/{}", decode_cstr(&info[2..], "info")?);
    let mut record = FileRecord::new(name, flags, None, 0);
    if record.is_deleted() {
        return Ok(record);
    }
    let missing = |chunk: &ChunkTag| {
        Error::corrupt(format!(
            "missing '{}' chunk in file record '{}'",
            tag_name(chunk),
            record.name
        ))
    };
    let time = find_chunk_content(CHUNK_TIME, data)?.ok_or_else(|| missing(CHUNK_TIME))?;
    let segm_list =
        find_chunk_content(CHUNK_SEGM_LIST, data)?.ok_or_else(|| missing(CHUNK_SEGM_LIST))?;
    let hash = find_chunk_content(CHUNK_HASH, data)?.ok_or_else(|| missing(CHUNK_HASH))?;
    let time = decode_time(time.content)?;
    let hash = ContentHash::from_slice(hash.content)
        .ok_or_else(|| Error::corrupt(format!("invalid hash chunk in '{}'", record.name)))?;
    let mut segments = Vec::new();
    for chunk in Chunks::new(segm_list.content) {
        let chunk = chunk?;
        if &chunk.tag == CHUNK_SEGM {
            segments.push(parse_segment(chunk.content)?);
        }
    }
    record.time = Some(time);
    record.hash = Some(hash);
    record.size = logical_size(&record.name, &segments)?;
    record.segments = segments;
    Ok(record)
}

/// Checks that `segments` tile the file from offset 0 and returns its size.
fn logical_size(name: &str, segments: &[Segment]) -> Result<u64> {
    let mut size = 0u64;
    for seg in segments {
        if seg.offset_in_file != size {
            return Err(Error::corrupt(format!(
                "segment of '{}' starts at {}, expected {}",
                name, seg.offset_in_file, size
            )));
        }
        if (seg.is_compressed && seg.archived_size > seg.original_size)
            || (!seg.is_compressed && seg.archived_size != seg.original_size)
        {
            return Err(Error::corrupt(format!(
                "segment of '{}' at offset {} stores {} bytes for {}",
                name, seg.offset_in_file, seg.archived_size, seg.original_size
            )));
        }
        size = size
            .checked_add(seg.original_size)
            .ok_or_else(|| Error::corrupt(format!("size of '{}' overflows", name)))?;
    }
    Ok(size)
}

/// Segment bodies must lie between the header and the index block.
fn check_extents(files: &[FileRecord], body_end: u64) -> Result<()> {
    for record in files {
        for seg in &record.segments {
            let end = seg.start.checked_add(seg.archived_size);
            if seg.start < HEADER_SIZE || end.is_none_or(|end| end > body_end) {
                return Err(Error::corrupt(format!(
                    "segment of '{}' at {} runs past the end of the segment area",
                    record.name, seg.start
                )));
            }
        }
    }
    Ok(())
}

fn parse_segment(data: &[u8]) -> Result<Segment> {
    if data.len() < SEGM_ENTRY_SIZE {
        return Err(Error::corrupt(format!(
            "segm chunk has {} bytes, expected {}",
            data.len(),
            SEGM_ENTRY_SIZE
        )));
    }
    let mut r = data;
    let flags = r.read_u8()?;
    let is_compressed = match flags & XP4_SEGM_ENCODE_METHOD_MASK {
        XP4_SEGM_ENCODE_RAW => false,
        XP4_SEGM_ENCODE_ZLIB => true,
        method => {
            return Err(Error::corrupt(format!(
                "unknown segment encode method {}",
                method
            )));
        }
    };
    Ok(Segment {
        is_compressed,
        offset_in_file: r.read_u64()?,
        original_size: r.read_u64()?,
        start: r.read_u64()?,
        archived_size: r.read_u64()?,
    })
}

fn decode_cstr(data: &[u8], chunk: &str) -> Result<String> {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8(data[..end].to_vec())
        .map_err(|_| Error::corrupt(format!("invalid UTF-8 string in '{}' chunk", chunk)))
}

enum Current {
    Idle,
    Raw(u64),
    Inflated(Cursor<Vec<u8>>),
}

/// Streams the logical content described by a list of segments.
pub struct ContentReader<R> {
    inner: R,
    segments: std::vec::IntoIter<Segment>,
    current: Current,
}

impl<R: Read + Seek> ContentReader<R> {
    pub fn new(inner: R, segments: &[Segment]) -> Self {
        Self {
            inner,
            segments: segments.to_vec().into_iter(),
            current: Current::Idle,
        }
    }

    fn next_segment(&mut self) -> Result<bool> {
        let Some(seg) = self.segments.next() else {
            return Ok(false);
        };
        self.inner.seek(SeekFrom::Start(seg.start))?;
        if seg.is_compressed {
            let mut stored = Vec::new();
            (&mut self.inner)
                .take(seg.archived_size)
                .read_to_end(&mut stored)?;
            if stored.len() as u64 != seg.archived_size {
                return Err(Error::corrupt(format!(
                    "segment at offset {} runs past the end of the volume",
                    seg.start
                )));
            }
            let mut data = Vec::new();
            ZlibDecoder::new(&stored[..])
                .take(seg.original_size.saturating_add(1))
                .read_to_end(&mut data)
                .map_err(|e| {
                    Error::DecompressionFailed(format!("segment at offset {}: {}", seg.start, e))
                })?;
            if data.len() as u64 != seg.original_size {
                return Err(Error::corrupt(format!(
                    "segment at offset {} inflates to {} bytes, expected {}",
                    seg.start,
                    data.len(),
                    seg.original_size
                )));
            }
            self.current = Current::Inflated(Cursor::new(data));
        } else {
            if seg.archived_size != seg.original_size {
                return Err(Error::corrupt(format!(
                    "raw segment at offset {} has mismatched sizes",
                    seg.start
                )));
            }
            self.current = Current::Raw(seg.original_size);
        }
        Ok(true)
    }
}

impl<R: Read + Seek> Read for ContentReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match &mut self.current {
                Current::Raw(left) if *left > 0 => {
                    let want = (*left).min(buf.len() as u64) as usize;
                    let n = self.inner.read(&mut buf[..want])?;
                    if n == 0 {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "segment runs past the end of the volume",
                        ));
                    }
                    *left -= n as u64;
                    return Ok(n);
                }
                Current::Inflated(data) => {
                    let n = data.read(buf)?;
                    if n > 0 {
                        return Ok(n);
                    }
                }
                _ => {}
            }
            self.current = Current::Idle;
            if !self.next_segment().map_err(Error::into_io)? {
                return Ok(0);
            }
        }
    }
}

/// Opens the volume at `volume` and streams the logical content of `record`.
pub fn open_content(volume: &Path, record: &FileRecord) -> Result<ContentReader<BufReader<File>>> {
    let file = File::open(volume)?;
    Ok(ContentReader::new(BufReader::new(file), &record.segments))
}

/// Writes the content of `record` stored in `volume` to `out`, verifying
/// its size and SHA-1. Returns the number of bytes written.
pub fn extract_record<W: Write + ?Sized>(
    volume: &Path,
    record: &FileRecord,
    out: &mut W,
) -> Result<u64> {
    if record.is_deleted() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("'{}' is a deletion record and has no content", record.name),
        )));
    }
    extract_inner(volume, record, out).map_err(|e| e.in_volume(volume))
}

fn extract_inner<W: Write + ?Sized>(volume: &Path, record: &FileRecord, out: &mut W) -> Result<u64> {
    let mut reader = HashingReader::new(open_content(volume, record)?);
    let written = std::io::copy(&mut reader, out).map_err(Error::from_io)?;
    if written != record.size {
        return Err(Error::corrupt(format!(
            "'{}' holds {} bytes, expected {}",
            record.name, written, record.size
        )));
    }
    if let Some(expected) = record.hash {
        let actual = reader.into_hash();
        if actual != expected {
            return Err(Error::corrupt(format!(
                "content hash mismatch for '{}': stored {}, computed {}",
                record.name, expected, actual
            )));
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIME: [u8; TIME_SIZE] = [0xe7, 0x07, 6, 1, 8, 30, 0, 5, 0];

    fn segm(compressed: bool, offset: u64, original: u64, start: u64, archived: u64) -> Vec<u8> {
        let mut entry = vec![if compressed { XP4_SEGM_ENCODE_ZLIB } else { XP4_SEGM_ENCODE_RAW }];
        for value in [offset, original, start, archived] {
            entry.extend_from_slice(&value.to_le_bytes());
        }
        entry
    }

    fn file_chunk(segms: Option<&[Vec<u8>]>, hash: bool) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(segms) = segms {
            let mut list = Vec::new();
            for entry in segms {
                write_chunk(&mut list, CHUNK_SEGM, entry).unwrap();
            }
            write_chunk(&mut out, CHUNK_SEGM_LIST, &list).unwrap();
        }
        if hash {
            write_chunk(&mut out, CHUNK_HASH, &[0u8; HASH_SIZE]).unwrap();
        }
        write_chunk(&mut out, CHUNK_TIME, &TIME).unwrap();
        write_chunk(&mut out, CHUNK_INFO, b"\x01\x00a.bin\x00").unwrap();
        out
    }

    fn corrupt_message(result: Result<FileRecord>) -> String {
        match result {
            Err(Error::CorruptArchive(msg)) => msg,
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_contiguous_segments_give_total_size() {
        let segms = [segm(false, 0, 100, 24, 100), segm(true, 100, 50, 128, 20)];
        let record = parse_file_record(&file_chunk(Some(&segms), true)).unwrap();
        assert_eq!(record.name, "/a.bin");
        assert_eq!(record.size, 150);
        assert_eq!(record.segments.len(), 2);
    }

    #[test]
    fn test_segment_size_overflow_is_corrupt() {
        let half = 1u64 << 63;
        let segms = [segm(false, 0, half, 24, half), segm(false, half, half, 24, half)];
        let msg = corrupt_message(parse_file_record(&file_chunk(Some(&segms), true)));
        assert!(msg.contains("overflows"), "{}", msg);
    }

    #[test]
    fn test_segment_gap_is_corrupt() {
        let segms = [segm(false, 0, 10, 24, 10), segm(false, 12, 10, 40, 10)];
        let msg = corrupt_message(parse_file_record(&file_chunk(Some(&segms), true)));
        assert!(msg.contains("starts at 12, expected 10"), "{}", msg);
    }

    #[test]
    fn test_inflating_segment_sizes_are_corrupt() {
        let grown = [segm(true, 0, 10, 24, 11)];
        let msg = corrupt_message(parse_file_record(&file_chunk(Some(&grown), true)));
        assert!(msg.contains("stores 11 bytes for 10"), "{}", msg);

        let raw = [segm(false, 0, 10, 24, 9)];
        assert!(matches!(
            parse_file_record(&file_chunk(Some(&raw), true)),
            Err(Error::CorruptArchive(_))
        ));
    }

    #[test]
    fn test_segment_extents_must_stay_before_index() {
        let mut record = FileRecord::new("/a.bin", 0, None, 10);
        record.segments.push(Segment {
            is_compressed: false,
            offset_in_file: 0,
            original_size: 10,
            start: 24,
            archived_size: 10,
        });
        assert!(check_extents(std::slice::from_ref(&record), 40).is_ok());
        assert!(matches!(
            check_extents(std::slice::from_ref(&record), 32),
            Err(Error::CorruptArchive(_))
        ));
        record.segments[0].start = u64::MAX - 2;
        assert!(matches!(
            check_extents(std::slice::from_ref(&record), u64::MAX),
            Err(Error::CorruptArchive(_))
        ));
        record.segments[0].start = 0;
        assert!(check_extents(&[record], 40).is_err());
    }

    #[test]
    fn test_missing_segm_is_corrupt() {
        let msg = corrupt_message(parse_file_record(&file_chunk(None, true)));
        assert!(msg.contains("'Segm'"), "{}", msg);
    }

    #[test]
    fn test_missing_hash_is_corrupt() {
        let msg = corrupt_message(parse_file_record(&file_chunk(Some(&[]), false)));
        assert!(msg.contains("'sha1'"), "{}", msg);
    }

    #[test]
    fn test_index_without_item_is_corrupt() {
        let mut targ = Vec::new();
        write_chunk(&mut targ, CHUNK_TARG, b"dir\0").unwrap();
        let mut data = Vec::new();
        write_chunk(&mut data, CHUNK_META, &targ).unwrap();
        match parse_index(&data) {
            Err(Error::CorruptArchive(msg)) => assert!(msg.contains("'Item'"), "{}", msg),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
