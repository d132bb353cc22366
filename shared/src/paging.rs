// User addresses are 32 bits wide; the casts below cannot truncate one.
#![allow(clippy::cast_possible_truncation)]

use crate::mem::VirtAddr;
use arbitrary_int::{u10, u12};
use bitbybit::bitfield;

/// Number of entries in each level of a two-level page table.
pub const PAGE_TABLE_LEN: usize = 1 << 10;

#[bitfield(u32)]
pub struct VirtualAddress {
    #[bits(22..=31, r)]
    page_directory_index: u10,
    #[bits(12..=21, r)]
    page_table_index: u10,
    #[bits(0..=11, r)]
    offset: u12,
}

impl VirtualAddress {
    pub const fn from_addr(addr: VirtAddr) -> Self {
        Self::new_with_raw_value(addr as u32)
    }

    pub fn directory_slot(&self) -> usize {
        usize::from(self.page_directory_index().value())
    }

    pub fn table_slot(&self) -> usize {
        usize::from(self.page_table_index().value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_user_address() {
        let addr = VirtualAddress::from_addr(0x0040_3abc);
        assert_eq!(addr.directory_slot(), 1);
        assert_eq!(addr.table_slot(), 3);
        assert_eq!(addr.offset().value(), 0xabc);

        let stack = VirtualAddress::from_addr(0x7fff_f000);
        assert_eq!(stack.directory_slot(), PAGE_TABLE_LEN / 2 - 1);
        assert_eq!(stack.table_slot(), PAGE_TABLE_LEN - 1);
    }
}
