use crate::mem::frame_table::FrameNum;
use crate::swapping::SwapSlot;

pub type PageNum = usize;

/// Translation and residency record for one virtual page.
///
/// The frame index is only meaningful while `valid` is set; the flag is the
/// sole source of truth for whether the page-to-frame relation is live.
#[derive(Clone, Copy, Debug)]
pub struct PageTableEntry {
    vpn: PageNum,
    valid: bool,
    frame: FrameNum,
    access_count: u64,
    swap_slot: SwapSlot,
}

impl PageTableEntry {
    fn new(vpn: PageNum, swap_slot: SwapSlot) -> Self {
        PageTableEntry {
            vpn,
            valid: false,
            frame: 0,
            access_count: 0,
            swap_slot,
        }
    }

    pub fn vpn(&self) -> PageNum {
        self.vpn
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The frame backing this page, if resident.
    pub fn frame(&self) -> Option<FrameNum> {
        self.valid.then_some(self.frame)
    }

    /// How many times this page has been faulted into memory. Ranking key
    /// for victim selection.
    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    /// Backing-store slot holding this page while it is not resident.
    /// Assigned when the address space is built, stable for its lifetime.
    pub fn swap_slot(&self) -> SwapSlot {
        self.swap_slot
    }

    pub(crate) fn install(&mut self, frame: FrameNum) {
        self.valid = true;
        self.frame = frame;
    }

    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
        self.frame = 0;
    }

    pub(crate) fn bump_access(&mut self) {
        self.access_count += 1;
    }

    /// Back to a baseline of exactly one fault event, not zero. A frame
    /// whose page ranked at zero would be re-selected on the very next
    /// fault, before the page has been touched at all.
    pub(crate) fn reset_access(&mut self) {
        self.access_count = 1;
    }
}

/// One process's page table. Entries are created here when the address
/// space is built and never added or removed afterwards; the fault handler
/// only flips residency and counters.
pub struct PageTable {
    entries: Box<[PageTableEntry]>,
}

impl PageTable {
    pub fn new(slots: &[SwapSlot]) -> Self {
        PageTable {
            entries: slots
                .iter()
                .enumerate()
                .map(|(vpn, &slot)| PageTableEntry::new(vpn, slot))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, vpn: PageNum) -> Option<&PageTableEntry> {
        self.entries.get(vpn)
    }

    pub(crate) fn get_mut(&mut self, vpn: PageNum) -> Option<&mut PageTableEntry> {
        self.entries.get_mut(vpn)
    }

    pub fn resident_count(&self) -> usize {
        self.entries.iter().filter(|e| e.valid).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageTableEntry> {
        self.entries.iter()
    }
}
