use crate::mem::PageId;
use bitbybit::bitfield;

pub type FrameNum = usize;

#[bitfield(u8, default = 0)]
pub struct FrameFlags {
    #[bit(0, rw)]
    occupied: bool,
    #[bit(1, rw)]
    pinned: bool,
}

/// One slot per physical frame: the occupancy flags plus a back-reference
/// to the page currently resident in the frame.
#[derive(Clone, Copy)]
struct FrameEntry {
    flags: FrameFlags,
    occupant: Option<PageId>,
}

/// Tracks every physical frame of the machine. The back-references here and
/// the frame indices in the page tables describe the same relation from both
/// ends; the fault handler keeps the two in lockstep, and the mutators below
/// assert it.
pub struct FrameTable {
    entries: Box<[FrameEntry]>,
}

impl FrameTable {
    pub fn new(num_frames: usize) -> Self {
        let empty = FrameEntry {
            flags: FrameFlags::DEFAULT,
            occupant: None,
        };
        FrameTable {
            entries: vec![empty; num_frames].into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First unoccupied frame in increasing index order, or `None` when
    /// every frame up to the machine's total is taken. No side effects;
    /// the caller marks the frame occupied with [`FrameTable::claim`].
    pub fn find_free(&self) -> Option<FrameNum> {
        self.entries.iter().position(|e| !e.flags.occupied())
    }

    pub fn claim(&mut self, frame: FrameNum, page: PageId) {
        let entry = &mut self.entries[frame];
        assert!(!entry.flags.occupied(), "frame {} is already occupied", frame);
        entry.flags = entry.flags.with_occupied(true);
        entry.occupant = Some(page);
    }

    pub fn release(&mut self, frame: FrameNum) -> PageId {
        let entry = &mut self.entries[frame];
        assert!(entry.flags.occupied(), "frame {} is not occupied", frame);
        entry.flags = entry.flags.with_occupied(false);
        entry
            .occupant
            .take()
            .expect("occupied frame with no back-reference")
    }

    pub fn occupant(&self, frame: FrameNum) -> Option<PageId> {
        let entry = &self.entries[frame];
        if entry.flags.occupied() {
            entry.occupant
        } else {
            None
        }
    }

    /// Pinned frames are never selected for eviction, e.g. while their
    /// contents are in the middle of device I/O.
    pub fn set_pinned(&mut self, frame: FrameNum, pinned: bool) {
        let entry = &mut self.entries[frame];
        entry.flags = entry.flags.with_pinned(pinned);
    }

    pub fn is_pinned(&self, frame: FrameNum) -> bool {
        self.entries[frame].flags.pinned()
    }

    pub fn occupied_count(&self) -> usize {
        self.entries.iter().filter(|e| e.flags.occupied()).count()
    }

    pub fn iter_occupied(&self) -> impl Iterator<Item = (FrameNum, PageId)> + '_ {
        self.entries.iter().enumerate().filter_map(|(frame, e)| {
            if e.flags.occupied() {
                Some((
                    frame,
                    e.occupant.expect("occupied frame with no back-reference"),
                ))
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(vpn: usize) -> PageId {
        PageId { asid: 0, vpn }
    }

    #[test]
    fn find_free_returns_lowest_index_first() {
        let mut frames = FrameTable::new(3);
        assert_eq!(frames.find_free(), Some(0));
        frames.claim(0, page(0));
        assert_eq!(frames.find_free(), Some(1));
        frames.claim(2, page(2));
        assert_eq!(frames.find_free(), Some(1));
        frames.claim(1, page(1));
        assert_eq!(frames.find_free(), None);
    }

    #[test]
    fn claim_and_release_track_the_occupant() {
        let mut frames = FrameTable::new(2);
        frames.claim(1, page(7));
        assert_eq!(frames.occupant(1), Some(page(7)));
        assert_eq!(frames.occupant(0), None);
        assert_eq!(frames.occupied_count(), 1);

        assert_eq!(frames.release(1), page(7));
        assert_eq!(frames.occupant(1), None);
        assert_eq!(frames.occupied_count(), 0);
    }

    #[test]
    fn iter_occupied_walks_in_index_order() {
        let mut frames = FrameTable::new(4);
        frames.claim(3, page(3));
        frames.claim(1, page(1));
        let seen: Vec<_> = frames.iter_occupied().collect();
        assert_eq!(seen, vec![(1, page(1)), (3, page(3))]);
    }

    #[test]
    fn pinning_does_not_affect_occupancy() {
        let mut frames = FrameTable::new(1);
        frames.set_pinned(0, true);
        assert!(frames.is_pinned(0));
        assert_eq!(frames.find_free(), Some(0));
    }

    #[test]
    #[should_panic(expected = "already occupied")]
    fn double_claim_panics() {
        let mut frames = FrameTable::new(1);
        frames.claim(0, page(0));
        frames.claim(0, page(1));
    }

    #[test]
    #[should_panic(expected = "not occupied")]
    fn release_of_free_frame_panics() {
        let mut frames = FrameTable::new(1);
        frames.release(0);
    }
}
