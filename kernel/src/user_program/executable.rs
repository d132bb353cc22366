//! Reading a process's loadable segments out of its executable.
//!
//! Parsing the executable format is the loader's business. By the time a
//! page faults, all the VM system needs is "copy these bytes from this
//! offset", which is what [`SegmentReader`] provides.

use alloc::boxed::Box;
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// The executable ended before `expected` bytes at `offset` could be read.
    ShortRead {
        offset: usize,
        expected: usize,
        available: usize,
    },
    /// The destination cannot hold `mem_size` bytes.
    BadSegment,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoadError::ShortRead {
                offset,
                expected,
                available,
            } => write!(
                f,
                "short read at offset {offset:#x}: wanted {expected} bytes, got {available}"
            ),
            LoadError::BadSegment => write!(f, "segment larger than its destination"),
        }
    }
}

pub trait SegmentReader {
    /// Copy `min(mem_size, file_size)` bytes starting at `offset` into the
    /// front of `dest` and zero the rest of its first `mem_size` bytes.
    fn read_segment(
        &self,
        offset: usize,
        dest: &mut [u8],
        mem_size: usize,
        file_size: usize,
    ) -> Result<(), LoadError>;
}

/// An executable held entirely in memory.
pub struct ExecutableImage {
    bytes: Box<[u8]>,
}

impl ExecutableImage {
    pub fn new(bytes: impl Into<Box<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl SegmentReader for ExecutableImage {
    fn read_segment(
        &self,
        offset: usize,
        dest: &mut [u8],
        mem_size: usize,
        file_size: usize,
    ) -> Result<(), LoadError> {
        let dest = dest.get_mut(..mem_size).ok_or(LoadError::BadSegment)?;

        let available = self.bytes.len().saturating_sub(offset);
        if available < file_size {
            return Err(LoadError::ShortRead {
                offset,
                expected: file_size,
                available,
            });
        }

        let copied = file_size.min(mem_size);
        if copied > 0 {
            dest[..copied].copy_from_slice(&self.bytes[offset..offset + copied]);
        }
        dest[copied..].fill(0);
        Ok(())
    }
}
