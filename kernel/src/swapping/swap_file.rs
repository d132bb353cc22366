use alloc::boxed::Box;
use alloc::vec;

/// Backing file for swapped pages.
///
/// Transfers report how many bytes actually moved. Anything short of the
/// requested length is treated by the caller as an I/O error.
pub trait SwapFile {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> usize;

    fn write_at(&mut self, offset: usize, buf: &[u8]) -> usize;
}

/// A swap file held in memory. Stands in for the swap disk on hosted builds.
pub struct RamSwapFile {
    data: Box<[u8]>,
}

impl RamSwapFile {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
        }
    }
}

impl SwapFile for RamSwapFile {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> usize {
        let Some(src) = self.data.get(offset..) else {
            return 0;
        };
        let n = buf.len().min(src.len());
        buf[..n].copy_from_slice(&src[..n]);
        n
    }

    fn write_at(&mut self, offset: usize, buf: &[u8]) -> usize {
        let Some(dst) = self.data.get_mut(offset..) else {
            return 0;
        };
        let n = buf.len().min(dst.len());
        dst[..n].copy_from_slice(&buf[..n]);
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfers_stop_at_end_of_file() {
        let mut file = RamSwapFile::new(8);
        assert_eq!(file.write_at(6, &[1, 2, 3, 4]), 2);
        assert_eq!(file.write_at(9, &[1]), 0);

        let mut buf = [0u8; 4];
        assert_eq!(file.read_at(4, &mut buf), 4);
        assert_eq!(buf, [0, 0, 1, 2]);
        assert_eq!(file.read_at(8, &mut buf), 0);
    }
}
