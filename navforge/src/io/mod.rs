//! Binary stream reading.
//!
//! [`BinaryReader`] is a sequential, typed, position-tracking reader used
//! by the scenery archive adapter and the magnetic declination grid
//! loader. All multi-byte values are little-endian.
//!
//! Archive traversal uses tagged framed records: every record starts with
//! a 16-bit type tag and a 32-bit length. The caller drives the dispatch
//! loop:
//!
//! ```ignore
//! while reader.pos() < frame.end() {
//!     let child = reader.read_record_header(&frame)?;
//!     match child.tag { /* dispatch */ }
//!     reader.seek_to(child.end())?;
//! }
//! ```

mod binary;

pub use binary::{BinaryReader, ReadError, RecordHeader, RECORD_HEADER_SIZE};
