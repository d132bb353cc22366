//! Counters for what the fault path did, and the identities they must obey.

use crate::user_program::PageFill;
use alloc::vec::Vec;
use vmos_shared::{eprintln, println};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VmStat {
    TlbFault,
    TlbFaultFree,
    TlbFaultReplace,
    TlbInvalidate,
    TlbReload,
    PageFaultZero,
    PageFaultDisk,
    ElfFileRead,
    SwapFileRead,
    SwapFileWrite,
}

impl VmStat {
    pub const COUNT: usize = 10;

    pub const ALL: [VmStat; Self::COUNT] = [
        VmStat::TlbFault,
        VmStat::TlbFaultFree,
        VmStat::TlbFaultReplace,
        VmStat::TlbInvalidate,
        VmStat::TlbReload,
        VmStat::PageFaultZero,
        VmStat::PageFaultDisk,
        VmStat::ElfFileRead,
        VmStat::SwapFileRead,
        VmStat::SwapFileWrite,
    ];

    pub fn name(self) -> &'static str {
        match self {
            VmStat::TlbFault => "TLB Faults",
            VmStat::TlbFaultFree => "TLB Faults with Free",
            VmStat::TlbFaultReplace => "TLB Faults with Replace",
            VmStat::TlbInvalidate => "TLB Invalidations",
            VmStat::TlbReload => "TLB Reloads",
            VmStat::PageFaultZero => "Page Faults (Zero filled)",
            VmStat::PageFaultDisk => "Page Faults (Disk)",
            VmStat::ElfFileRead => "Page Faults from ELF",
            VmStat::SwapFileRead => "Page Faults from Swapfile",
            VmStat::SwapFileWrite => "Swapfile Writes",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct VmStats {
    counts: [u64; VmStat::COUNT],
}

impl VmStats {
    pub fn inc(&mut self, stat: VmStat) {
        self.counts[stat as usize] += 1;
    }

    pub fn get(&self, stat: VmStat) -> u64 {
        self.counts[stat as usize]
    }

    /// Count a page fault that was served without the swap file.
    pub fn record_fill(&mut self, fill: PageFill) {
        match fill {
            PageFill::Zeroed => self.inc(VmStat::PageFaultZero),
            PageFill::Loaded => {
                self.inc(VmStat::PageFaultDisk);
                self.inc(VmStat::ElfFileRead);
            }
        }
    }

    /// Identities between the counters that do not hold.
    pub fn violations(&self) -> Vec<&'static str> {
        let faults = self.get(VmStat::TlbFault);
        let disk = self.get(VmStat::PageFaultDisk);

        let mut found = Vec::new();
        if faults != self.get(VmStat::TlbFaultFree) + self.get(VmStat::TlbFaultReplace) {
            found.push("TLB Faults != TLB Faults with Free + TLB Faults with Replace");
        }
        if faults != self.get(VmStat::TlbReload) + disk + self.get(VmStat::PageFaultZero) {
            found.push("TLB Faults != TLB Reloads + Page Faults (Disk) + Page Faults (Zero filled)");
        }
        if disk != self.get(VmStat::ElfFileRead) + self.get(VmStat::SwapFileRead) {
            found.push("Page Faults (Disk) != ELF File reads + Swapfile reads");
        }
        found
    }

    pub fn print(&self) {
        println!("VM stats:");
        for stat in VmStat::ALL {
            println!("  {:<28} {}", stat.name(), self.get(stat));
        }
        for violation in self.violations() {
            eprintln!("Warning: {violation}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_counters_are_consistent() {
        let stats = VmStats::default();
        assert!(stats.violations().is_empty());
        assert!(VmStat::ALL
            .iter()
            .enumerate()
            .all(|(i, &stat)| stat as usize == i));
    }

    #[test]
    fn test_violations_name_broken_identities() {
        let mut stats = VmStats::default();
        stats.inc(VmStat::TlbFault);
        stats.inc(VmStat::TlbFaultFree);
        stats.record_fill(PageFill::Loaded);
        assert!(stats.violations().is_empty());

        stats.inc(VmStat::SwapFileRead);
        assert_eq!(
            stats.violations(),
            ["Page Faults (Disk) != ELF File reads + Swapfile reads"]
        );
    }
}
