//! Tag/size/content chunk streams.
//!
//! Every structure of the index is a sequence of chunks laid out as
//! `tag: [u8; 4]`, `size: u32 LE`, `content: [u8; size]`.
use crate::error::{Error, Result};
use std::io::Write;

pub type ChunkTag = [u8; 4];

pub const CHUNK_HEADER_SIZE: usize = 8;

/// One chunk of a stream, borrowing its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub tag: ChunkTag,
    /// Offset of the content relative to the start of the scanned buffer.
    pub offset: usize,
    pub content: &'a [u8],
}

/// Iterates over the chunks of a buffer.
///
/// Yields an error and then stops when a chunk header is truncated or a
/// declared size runs past the end of the buffer.
pub struct Chunks<'a> {
    data: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> Chunks<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Result<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }
        let rest = &self.data[self.pos..];
        if rest.len() < CHUNK_HEADER_SIZE {
            self.failed = true;
            return Some(Err(Error::corrupt(format!(
                "truncated chunk header at offset {}",
                self.pos
            ))));
        }
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&rest[..4]);
        let size = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let offset = self.pos + CHUNK_HEADER_SIZE;
        if size > self.data.len() - offset {
            self.failed = true;
            return Some(Err(Error::corrupt(format!(
                "chunk '{}' at offset {} declares {} bytes but only {} remain",
                tag_name(&tag),
                self.pos,
                size,
                self.data.len() - offset
            ))));
        }
        self.pos = offset + size;
        Some(Ok(Chunk {
            tag,
            offset,
            content: &self.data[offset..offset + size],
        }))
    }
}

/// Finds the first chunk tagged `tag` and returns `(content_offset, content_size)`.
pub fn find_chunk(tag: &ChunkTag, data: &[u8]) -> Result<Option<(usize, usize)>> {
    Ok(find_chunk_content(tag, data)?.map(|c| (c.offset, c.content.len())))
}

/// Like [`find_chunk`], but returns the chunk itself.
pub fn find_chunk_content<'a>(tag: &ChunkTag, data: &'a [u8]) -> Result<Option<Chunk<'a>>> {
    for chunk in Chunks::new(data) {
        let chunk = chunk?;
        if &chunk.tag == tag {
            return Ok(Some(chunk));
        }
    }
    Ok(None)
}

/// Appends `tag ++ u32(len) ++ content` to `out`.
pub fn write_chunk<W: Write + ?Sized>(out: &mut W, tag: &ChunkTag, content: &[u8]) -> Result<()> {
    let size = u32::try_from(content.len()).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("chunk '{}' is too large", tag_name(tag)),
        )
    })?;
    out.write_all(tag)?;
    out.write_all(&size.to_le_bytes())?;
    out.write_all(content)?;
    Ok(())
}

pub fn tag_name(tag: &ChunkTag) -> String {
    String::from_utf8_lossy(tag).into_owned()
}
