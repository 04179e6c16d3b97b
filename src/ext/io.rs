//! Little-endian helpers for [std::io] readers and writers.
use std::io::*;

pub trait ReadExt {
    fn read_u8(&mut self) -> Result<u8>;
    fn read_u16(&mut self) -> Result<u16>;
    fn read_u32(&mut self) -> Result<u32>;
    fn read_u64(&mut self) -> Result<u64>;

    fn read_exact_vec(&mut self, len: usize) -> Result<Vec<u8>>;
}

impl<T: Read> ReadExt for T {
    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }
    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }
    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }
    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn read_exact_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

pub trait WriteExt {
    fn write_u8(&mut self, value: u8) -> Result<()>;
    fn write_u16(&mut self, value: u16) -> Result<()>;
    fn write_u32(&mut self, value: u32) -> Result<()>;
    fn write_u64(&mut self, value: u64) -> Result<()>;
}

impl<T: Write> WriteExt for T {
    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_all(&value.to_le_bytes())
    }
    fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_all(&value.to_le_bytes())
    }
    fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_all(&value.to_le_bytes())
    }
    fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_all(&value.to_le_bytes())
    }
}

/// Positioned writes and padding for seekable writers.
pub trait WriteSeekExt {
    /// Pads with zero bytes until the stream position is a multiple of `align`.
    /// Returns the new position.
    fn align_to(&mut self, align: u64) -> Result<u64>;
    /// Writes `data` at `pos`, then restores the current position.
    fn write_all_at(&mut self, pos: u64, data: &[u8]) -> Result<()>;
    fn write_u64_at(&mut self, pos: u64, value: u64) -> Result<()> {
        self.write_all_at(pos, &value.to_le_bytes())
    }
}

impl<T: Write + Seek> WriteSeekExt for T {
    fn align_to(&mut self, align: u64) -> Result<u64> {
        let pos = self.stream_position()?;
        let padded = pos.next_multiple_of(align);
        if padded > pos {
            const ZEROS: [u8; 16] = [0; 16];
            let mut left = padded - pos;
            while left > 0 {
                let n = left.min(ZEROS.len() as u64) as usize;
                self.write_all(&ZEROS[..n])?;
                left -= n as u64;
            }
        }
        Ok(padded)
    }

    fn write_all_at(&mut self, pos: u64, data: &[u8]) -> Result<()> {
        let current = self.stream_position()?;
        self.seek(SeekFrom::Start(pos))?;
        self.write_all(data)?;
        self.seek(SeekFrom::Start(current))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_pads_with_zeros() {
        let mut c = Cursor::new(Vec::new());
        c.write_all(b"abc").unwrap();
        assert_eq!(c.align_to(8).unwrap(), 8);
        assert_eq!(c.get_ref().as_slice(), b"abc\0\0\0\0\0");
        assert_eq!(c.align_to(8).unwrap(), 8);
        assert_eq!(c.get_ref().len(), 8);
    }

    #[test]
    fn test_write_at_restores_position() {
        let mut c = Cursor::new(vec![0u8; 16]);
        c.seek(SeekFrom::Start(12)).unwrap();
        c.write_u64_at(2, 0x0102030405060708).unwrap();
        assert_eq!(c.stream_position().unwrap(), 12);
        assert_eq!(&c.get_ref()[2..10], &[8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_read_le_values_from_slice() {
        let data = [1u8, 2, 0, 3, 0, 0, 0];
        let mut r = &data[..];
        assert_eq!(r.read_u8().unwrap(), 1);
        assert_eq!(r.read_u16().unwrap(), 2);
        assert_eq!(r.read_u32().unwrap(), 3);
        assert!(r.read_u8().is_err());
    }
}
