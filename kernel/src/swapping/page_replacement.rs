use crate::mem::frame_table::{FrameNum, FrameTable};
use crate::mem::AddressSpaceTable;

/// Chooses which occupied frame loses its page when none is free.
pub trait ReplacementPolicy {
    /// Returns the frame to evict. Only called once the frame table has
    /// reported exhaustion, so a victim must exist; a policy that cannot
    /// produce one has hit a logic error, not a recoverable condition.
    fn select_victim(&mut self, frames: &FrameTable, spaces: &AddressSpaceTable) -> FrameNum;
}

/// Evicts the page that has been faulted into memory the fewest times.
///
/// Least-frequently-faulted-in is an approximation of least-recently-used,
/// not true recency. Ties break to the lowest frame index. Pinned frames
/// are skipped.
#[derive(Default)]
pub struct LeastFaulted;

impl ReplacementPolicy for LeastFaulted {
    fn select_victim(&mut self, frames: &FrameTable, spaces: &AddressSpaceTable) -> FrameNum {
        let mut victim = None;
        let mut min_count = u64::MAX;

        for (frame, page) in frames.iter_occupied() {
            if frames.is_pinned(frame) {
                continue;
            }
            let entry = spaces
                .entry(page)
                .expect("frame back-reference points at a missing page table entry");
            let count = entry.access_count();
            if count < min_count {
                min_count = count;
                victim = Some(frame);
            }
        }

        victim.expect("select_victim called with no evictable frame")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{AddressSpace, PageId};

    // An address space whose pages carry the given access counts, with each
    // vpn resident in the same-numbered frame.
    fn setup(counts: &[u64]) -> (FrameTable, AddressSpaceTable, usize) {
        let slots: Vec<u32> = (0..counts.len() as u32).collect();
        let mut spaces = AddressSpaceTable::new();
        let asid = spaces.insert(AddressSpace::new(&slots));

        let mut frames = FrameTable::new(counts.len());
        for (vpn, &count) in counts.iter().enumerate() {
            let page = PageId { asid, vpn };
            frames.claim(vpn, page);
            let entry = spaces.entry_mut(page).expect("entry exists");
            entry.install(vpn);
            for _ in 0..count {
                entry.bump_access();
            }
        }
        (frames, spaces, asid)
    }

    #[test]
    fn lowest_count_wins() {
        let (frames, spaces, _) = setup(&[3, 1, 2]);
        assert_eq!(LeastFaulted.select_victim(&frames, &spaces), 1);
    }

    #[test]
    fn ties_break_to_the_lowest_frame_index() {
        let (frames, spaces, _) = setup(&[2, 1, 1]);
        assert_eq!(LeastFaulted.select_victim(&frames, &spaces), 1);

        let (frames, spaces, _) = setup(&[1, 1, 1]);
        assert_eq!(LeastFaulted.select_victim(&frames, &spaces), 0);
    }

    #[test]
    fn pinned_frames_are_never_selected() {
        let (mut frames, spaces, _) = setup(&[1, 5, 5]);
        frames.set_pinned(0, true);
        assert_eq!(LeastFaulted.select_victim(&frames, &spaces), 1);
    }

    #[test]
    fn unoccupied_frames_are_ignored() {
        let (mut frames, spaces, _) = setup(&[4, 2, 3]);
        frames.release(1);
        assert_eq!(LeastFaulted.select_victim(&frames, &spaces), 2);
    }

    #[test]
    #[should_panic(expected = "no evictable frame")]
    fn all_pinned_is_a_logic_error() {
        let (mut frames, spaces, _) = setup(&[1, 1]);
        frames.set_pinned(0, true);
        frames.set_pinned(1, true);
        LeastFaulted.select_victim(&frames, &spaces);
    }
}
