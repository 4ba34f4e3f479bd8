//! Endian-aware typed reader with tagged-frame support.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

/// Size of a record header on disk: 16-bit tag plus 32-bit length.
pub const RECORD_HEADER_SIZE: u64 = 6;

/// Errors produced while reading a binary stream.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The stream ended inside a value or record.
    #[error("unexpected end of stream at offset {offset}")]
    UnexpectedEof { offset: u64 },

    /// A record's declared length escapes its parent frame.
    #[error(
        "corrupted frame: record 0x{tag:04x} at offset {offset} with size {size} exceeds frame end {frame_end}"
    )]
    CorruptedFrame {
        tag: u16,
        offset: u64,
        size: u32,
        frame_end: u64,
    },

    /// A fixed-width string field contains bytes outside the allowed set.
    #[error("invalid string encoding at offset {offset}")]
    InvalidEncoding { offset: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Header of a tagged framed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Record type tag
    pub tag: u16,
    /// Total record size in bytes, header included
    pub size: u32,
    /// Stream offset of the header's first byte
    pub offset: u64,
}

impl RecordHeader {
    /// Offset one past the record's last byte.
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.size)
    }
}

/// Sequential little-endian reader over any seekable byte stream.
#[derive(Debug)]
pub struct BinaryReader<R> {
    inner: R,
    pos: u64,
    len: u64,
}

impl<R: Read + Seek> BinaryReader<R> {
    /// Wraps a stream, determining its total length.
    pub fn new(mut inner: R) -> Result<Self, ReadError> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, pos: 0, len })
    }

    /// Current offset from the start of the stream.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Total stream length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes left between the current offset and the end of the stream.
    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.pos)
    }

    /// Seeks to an absolute offset.
    pub fn seek_to(&mut self, offset: u64) -> Result<(), ReadError> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.pos = offset;
        Ok(())
    }

    /// Skips forward over `count` bytes.
    pub fn skip(&mut self, count: u64) -> Result<(), ReadError> {
        self.seek_to(self.pos + count)
    }

    fn check_available(&self, count: u64) -> Result<(), ReadError> {
        if self.remaining() < count {
            Err(ReadError::UnexpectedEof { offset: self.pos })
        } else {
            Ok(())
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, ReadError> {
        self.check_available(1)?;
        let v = self.inner.read_u8()?;
        self.pos += 1;
        Ok(v)
    }

    pub fn read_i8(&mut self) -> Result<i8, ReadError> {
        self.check_available(1)?;
        let v = self.inner.read_i8()?;
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16, ReadError> {
        self.check_available(2)?;
        let v = self.inner.read_u16::<LittleEndian>()?;
        self.pos += 2;
        Ok(v)
    }

    pub fn read_i16(&mut self) -> Result<i16, ReadError> {
        self.check_available(2)?;
        let v = self.inner.read_i16::<LittleEndian>()?;
        self.pos += 2;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> Result<u32, ReadError> {
        self.check_available(4)?;
        let v = self.inner.read_u32::<LittleEndian>()?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_i32(&mut self) -> Result<i32, ReadError> {
        self.check_available(4)?;
        let v = self.inner.read_i32::<LittleEndian>()?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_u64(&mut self) -> Result<u64, ReadError> {
        self.check_available(8)?;
        let v = self.inner.read_u64::<LittleEndian>()?;
        self.pos += 8;
        Ok(v)
    }

    pub fn read_i64(&mut self) -> Result<i64, ReadError> {
        self.check_available(8)?;
        let v = self.inner.read_i64::<LittleEndian>()?;
        self.pos += 8;
        Ok(v)
    }

    pub fn read_f32(&mut self) -> Result<f32, ReadError> {
        self.check_available(4)?;
        let v = self.inner.read_f32::<LittleEndian>()?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_f64(&mut self) -> Result<f64, ReadError> {
        self.check_available(8)?;
        let v = self.inner.read_f64::<LittleEndian>()?;
        self.pos += 8;
        Ok(v)
    }

    /// Reads `count` raw bytes.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, ReadError> {
        self.check_available(count as u64)?;
        let mut buf = vec![0u8; count];
        self.inner.read_exact(&mut buf)?;
        self.pos += count as u64;
        Ok(buf)
    }

    /// Reads a fixed-width string field.
    ///
    /// The field is NUL-padded on disk. Bytes after the first NUL are
    /// discarded; the remainder must be printable ASCII.
    pub fn read_string_fixed(&mut self, width: usize) -> Result<String, ReadError> {
        let offset = self.pos;
        let raw = self.read_bytes(width)?;
        let cut = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let slice = &raw[..cut];
        if !slice.iter().all(|&b| (0x20..0x7f).contains(&b)) {
            return Err(ReadError::InvalidEncoding { offset });
        }
        Ok(String::from_utf8_lossy(slice).trim_end().to_string())
    }

    /// Reads the header of the record starting at the current offset.
    ///
    /// The record must fit inside `parent`; a declared size smaller than
    /// the header itself or one that escapes the parent frame is reported
    /// as [`ReadError::CorruptedFrame`].
    pub fn read_record_header(&mut self, parent: &RecordHeader) -> Result<RecordHeader, ReadError> {
        self.read_record_header_bounded(parent.end())
    }

    /// Like [`read_record_header`](Self::read_record_header) with an
    /// explicit frame boundary, used for top-level records where the
    /// parent frame is the whole stream.
    pub fn read_record_header_bounded(&mut self, frame_end: u64) -> Result<RecordHeader, ReadError> {
        let offset = self.pos;
        let tag = self.read_u16()?;
        let size = self.read_u32()?;

        let header = RecordHeader { tag, size, offset };
        if u64::from(size) < RECORD_HEADER_SIZE || header.end() > frame_end {
            return Err(ReadError::CorruptedFrame {
                tag,
                offset,
                size,
                frame_end,
            });
        }
        Ok(header)
    }

    /// Frame header covering the whole stream, for top-level traversal.
    pub fn whole_stream_frame(&self) -> RecordHeader {
        RecordHeader {
            tag: 0,
            size: self.len as u32,
            offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(bytes: &[u8]) -> BinaryReader<Cursor<Vec<u8>>> {
        BinaryReader::new(Cursor::new(bytes.to_vec())).unwrap()
    }

    #[test]
    fn test_scalar_reads_little_endian() {
        let mut r = reader(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);
        assert_eq!(r.read_u8().unwrap(), 0x01);
        assert_eq!(r.read_u16().unwrap(), 0x0302);
        assert_eq!(r.read_u32().unwrap(), 0x07060504);
        assert_eq!(r.pos(), 7);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_read_f32() {
        let mut r = reader(&1.5f32.to_le_bytes());
        assert_eq!(r.read_f32().unwrap(), 1.5);
    }

    #[test]
    fn test_eof_reported_with_offset() {
        let mut r = reader(&[0x01]);
        r.read_u8().unwrap();
        match r.read_u32() {
            Err(ReadError::UnexpectedEof { offset }) => assert_eq!(offset, 1),
            other => panic!("expected EOF, got {other:?}"),
        }
    }

    #[test]
    fn test_fixed_string_nul_padded() {
        let mut r = reader(b"EDDF\0\0\0\0");
        assert_eq!(r.read_string_fixed(8).unwrap(), "EDDF");
        assert_eq!(r.pos(), 8);
    }

    #[test]
    fn test_fixed_string_rejects_binary_garbage() {
        let mut r = reader(&[0x41, 0x42, 0x01, 0x43]);
        assert!(matches!(
            r.read_string_fixed(4),
            Err(ReadError::InvalidEncoding { offset: 0 })
        ));
    }

    #[test]
    fn test_record_header_roundtrip() {
        // tag 0x003c, size 16, then 10 payload bytes
        let mut bytes = vec![0x3c, 0x00, 0x10, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(&[0u8; 10]);
        let mut r = reader(&bytes);

        let frame = r.whole_stream_frame();
        let header = r.read_record_header(&frame).unwrap();
        assert_eq!(header.tag, 0x003c);
        assert_eq!(header.size, 16);
        assert_eq!(header.offset, 0);
        assert_eq!(header.end(), 16);
    }

    #[test]
    fn test_child_record_must_fit_parent_frame() {
        // Parent frame ends at 12 but the child declares 64 bytes.
        let mut bytes = vec![0x11, 0x00, 0x40, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(&[0u8; 6]);
        let mut r = reader(&bytes);

        let parent = RecordHeader {
            tag: 0x3c,
            size: 12,
            offset: 0,
        };
        match r.read_record_header(&parent) {
            Err(ReadError::CorruptedFrame { tag, frame_end, .. }) => {
                assert_eq!(tag, 0x11);
                assert_eq!(frame_end, 12);
            }
            other => panic!("expected corrupted frame, got {other:?}"),
        }
    }

    #[test]
    fn test_undersized_record_is_corrupt() {
        // Declared size 2 is smaller than the 6-byte header.
        let bytes = vec![0x11, 0x00, 0x02, 0x00, 0x00, 0x00];
        let mut r = reader(&bytes);
        let frame = r.whole_stream_frame();
        assert!(matches!(
            r.read_record_header(&frame),
            Err(ReadError::CorruptedFrame { .. })
        ));
    }

    #[test]
    fn test_seek_and_skip() {
        let mut r = reader(&[0, 1, 2, 3, 4, 5, 6, 7]);
        r.skip(4).unwrap();
        assert_eq!(r.read_u8().unwrap(), 4);
        r.seek_to(1).unwrap();
        assert_eq!(r.read_u8().unwrap(), 1);
    }
}
