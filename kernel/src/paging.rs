//! Demand-paged per-process page tables.

pub mod page_replacement;
pub mod page_table;

pub use page_replacement::{FifoReplacement, PageReplacementPolicy};
pub use page_table::{PageState, PageTable, PageTableEntry};
