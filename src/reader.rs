//! Read-back of written stream files by index entry.
//!
//! The viewer side of the contract: stream files carry no in-band framing,
//! so payloads are located through the (offset, size, checksum) tuples in a
//! [`GeometryMetadata`](crate::summary::GeometryMetadata) index. Every
//! fetched range is verified against its stored checksum. Open a reader
//! only after the writer has been closed or flushed.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::summary::BatchIndexEntry;
use crate::util::{masked_crc32c, Error, Result};

/// Memory-mapped view of one stream file.
pub struct StreamReader {
    map: Mmap,
}

impl StreamReader {
    /// Map a stream file for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        // Safety: the mapping is read-only and the file is append-only by
        // convention; previously written ranges are never modified.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self { map })
    }

    /// File size in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.map.len() as u64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Fetch and verify a raw byte range.
    pub fn range(&self, start: u64, size: u64, masked_crc: u32) -> Result<&[u8]> {
        let end = start.checked_add(size).ok_or(Error::RangeOutOfBounds {
            start,
            size,
            len: self.len(),
        })?;
        if end > self.len() {
            return Err(Error::RangeOutOfBounds {
                start,
                size,
                len: self.len(),
            });
        }
        let data = &self.map[start as usize..end as usize];
        let actual = masked_crc32c(data);
        if actual != masked_crc {
            return Err(Error::ChecksumMismatch {
                offset: start,
                expected: masked_crc,
                actual,
            });
        }
        Ok(data)
    }

    /// The geometry payload for one batch element.
    pub fn payload(&self, entry: &BatchIndexEntry) -> Result<&[u8]> {
        self.range(entry.start, entry.size, entry.masked_crc32c)
    }

    /// The auxiliary sub-record for one batch element, if present.
    pub fn aux(&self, entry: &BatchIndexEntry) -> Result<Option<&[u8]>> {
        match entry.aux {
            Some(sub) => Ok(Some(self.range(sub.start, sub.size, sub.masked_crc32c)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn entry(start: u64, data: &[u8]) -> BatchIndexEntry {
        BatchIndexEntry {
            start,
            size: data.len() as u64,
            masked_crc32c: masked_crc32c(data),
            aux: None,
        }
    }

    #[test]
    fn test_payload_roundtrip() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"abcdefgh").unwrap();
        file.flush().unwrap();

        let reader = StreamReader::open(file.path()).unwrap();
        assert_eq!(reader.len(), 8);
        assert_eq!(reader.payload(&entry(0, b"abc")).unwrap(), b"abc");
        assert_eq!(reader.payload(&entry(3, b"defgh")).unwrap(), b"defgh");
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"abcdefgh").unwrap();
        file.flush().unwrap();

        let reader = StreamReader::open(file.path()).unwrap();
        let mut bad = entry(0, b"abc");
        bad.masked_crc32c ^= 1;
        assert!(matches!(
            reader.payload(&bad),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_range_out_of_bounds() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        file.flush().unwrap();

        let reader = StreamReader::open(file.path()).unwrap();
        assert!(matches!(
            reader.range(2, 10, 0),
            Err(Error::RangeOutOfBounds { .. })
        ));
        assert!(matches!(
            reader.range(u64::MAX, 1, 0),
            Err(Error::RangeOutOfBounds { .. })
        ));
    }
}
