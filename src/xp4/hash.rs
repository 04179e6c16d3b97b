use super::consts::{COPY_BUFFER_SIZE, HASH_SIZE};
use crate::error::{Error, Result};
use crate::utils::progress::Progress;
use sha1::{Digest, Sha1};
use std::io::Read;

/// SHA-1 digest of a file's logical content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub [u8; HASH_SIZE]);

impl ContentHash {
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self::from_hasher(hasher)
    }

    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let hash: [u8; HASH_SIZE] = data.try_into().ok()?;
        Some(Self(hash))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    fn from_hasher(hasher: Sha1) -> Self {
        let mut hash = [0u8; HASH_SIZE];
        hash.copy_from_slice(&hasher.finalize());
        Self(hash)
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl std::fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentHash({})", self)
    }
}

/// Reader adapter that hashes everything read through it.
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha1,
    read: u64,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha1::new(),
            read: 0,
        }
    }

    /// Bytes passed through so far.
    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    pub fn into_hash(self) -> ContentHash {
        ContentHash::from_hasher(self.hasher)
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.read += n as u64;
        Ok(n)
    }
}

/// Hashes a stream of `size` bytes, reporting progress against `size`.
pub fn hash_stream<R: Read>(reader: R, size: u64, progress: &mut dyn Progress) -> Result<ContentHash> {
    let mut reader = HashingReader::new(reader);
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    progress.report(0)?;
    loop {
        let n = reader.read(&mut buf).map_err(Error::from_io)?;
        if n == 0 {
            break;
        }
        if size > 0 {
            progress.report((reader.bytes_read().min(size) * 100 / size) as u32)?;
        }
    }
    progress.report(100)?;
    Ok(reader.into_hash())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::progress::NoProgress;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            ContentHash::of(b"abc").to_string(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_stream_matches_slice() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let h = hash_stream(&data[..], data.len() as u64, &mut NoProgress).unwrap();
        assert_eq!(h, ContentHash::of(&data));
    }

    #[test]
    fn test_from_slice_checks_length() {
        assert!(ContentHash::from_slice(&[0u8; 19]).is_none());
        assert!(ContentHash::from_slice(&[0u8; 20]).is_some());
    }
}
