//! Frame placement policies for the coremap.

use super::CoreMapEntry;
use alloc::boxed::Box;
use core::ops::Range;

/// A placement algorithm for allocating frames.
pub trait PlacementAlgorithm {
    /// Returns the frame indices of a run of `frames_requested` free frames,
    /// or [`None`] if no run that long exists.
    fn place(&mut self, core_map: &[CoreMapEntry], frames_requested: usize)
        -> Option<Range<usize>>;
}

/// Which [`PlacementAlgorithm`] the coremap is built with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Placement {
    #[default]
    FirstFit,
    NextFit,
}

impl Placement {
    pub fn algorithm(self) -> Box<dyn PlacementAlgorithm + Send> {
        match self {
            Placement::FirstFit => Box::new(FirstFit),
            Placement::NextFit => Box::<NextFit>::default(),
        }
    }
}

#[derive(Default)]
pub struct NextFit {
    /// Frame index the next search starts from.
    position: usize,
}

#[derive(Default)]
pub struct FirstFit;

/// Length of the free run starting at `start`, capped at `limit`.
fn free_run(core_map: &[CoreMapEntry], start: usize, limit: usize) -> usize {
    core_map[start..start + limit]
        .iter()
        .take_while(|entry| entry.is_free())
        .count()
}

impl PlacementAlgorithm for NextFit {
    fn place(
        &mut self,
        core_map: &[CoreMapEntry],
        frames_requested: usize,
    ) -> Option<Range<usize>> {
        let total_frames = core_map.len();

        let mut block_start = self.position;
        let mut wrapped_around = false;

        while !(wrapped_around && block_start >= self.position) {
            if block_start + frames_requested > total_frames {
                // A second wrap would spin forever on requests larger than
                // any hole.
                if wrapped_around {
                    break;
                }
                block_start = 0;
                wrapped_around = true;
                continue;
            }

            let block_size = free_run(core_map, block_start, frames_requested);
            if block_size == frames_requested {
                self.position = (block_start + block_size) % total_frames;
                return Some(block_start..block_start + block_size);
            }
            block_start += block_size + 1;
        }

        None
    }
}

impl PlacementAlgorithm for FirstFit {
    fn place(
        &mut self,
        core_map: &[CoreMapEntry],
        frames_requested: usize,
    ) -> Option<Range<usize>> {
        let mut block_start = 0;

        while block_start + frames_requested <= core_map.len() {
            let block_size = free_run(core_map, block_start, frames_requested);
            if block_size == frames_requested {
                return Some(block_start..block_start + block_size);
            }
            block_start += block_size + 1;
        }

        None
    }
}
