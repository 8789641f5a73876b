//! The virtual-memory subsystem: frame accounting, page tables, and the
//! demand-paging fault handler.
//!
//! All of the state lives in one owned [`VmManager`] passed around by
//! reference, so tests get a fresh instance each and nothing hides in
//! globals. One fault is serviced at a time, to completion; nothing here
//! yields mid-resolution.

pub mod frame_table;
pub mod page_table;
mod vm_error;

pub use vm_error::VmError;

use crate::machine::Machine;
use crate::swapping::{BackingStore, LeastFaulted, ReplacementPolicy, SwapSlot};
use frame_table::{FrameNum, FrameTable};
use osmos_shared::mem::PAGE_FRAME_SIZE;
use page_table::{PageNum, PageTable};
use std::collections::BTreeMap;

pub type AsId = usize;

/// Identity of a virtual page, unique across every live address space.
/// Stored in the frame table as the reverse half of the page/frame relation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PageId {
    pub asid: AsId,
    pub vpn: PageNum,
}

/// One process's virtual address space, as the memory manager sees it.
pub struct AddressSpace {
    page_table: PageTable,
}

impl AddressSpace {
    pub(crate) fn new(slots: &[SwapSlot]) -> Self {
        AddressSpace {
            page_table: PageTable::new(slots),
        }
    }

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }
}

/// Registry of every live address space.
pub struct AddressSpaceTable {
    spaces: BTreeMap<AsId, AddressSpace>,
    next_asid: AsId,
}

impl AddressSpaceTable {
    pub(crate) fn new() -> Self {
        AddressSpaceTable {
            spaces: BTreeMap::new(),
            next_asid: 0,
        }
    }

    pub(crate) fn insert(&mut self, space: AddressSpace) -> AsId {
        let asid = self.next_asid;
        self.next_asid += 1;
        self.spaces.insert(asid, space);
        asid
    }

    pub(crate) fn remove(&mut self, asid: AsId) -> Option<AddressSpace> {
        self.spaces.remove(&asid)
    }

    pub fn get(&self, asid: AsId) -> Option<&AddressSpace> {
        self.spaces.get(&asid)
    }

    pub fn entry(&self, page: PageId) -> Option<&page_table::PageTableEntry> {
        self.spaces.get(&page.asid)?.page_table.get(page.vpn)
    }

    pub(crate) fn entry_mut(&mut self, page: PageId) -> Option<&mut page_table::PageTableEntry> {
        self.spaces.get_mut(&page.asid)?.page_table.get_mut(page.vpn)
    }

    /// Resident pages summed over every address space. Always equal to the
    /// number of occupied frames.
    pub fn resident_count(&self) -> usize {
        self.spaces
            .values()
            .map(|s| s.page_table.resident_count())
            .sum()
    }
}

/// Fault-handling counters, exposed for observability only.
#[derive(Clone, Copy, Default, Debug)]
pub struct VmStats {
    pub page_faults: u64,
    pub direct_loads: u64,
    pub evictions: u64,
}

/// Owns the physical frame table and every page table, and resolves page
/// faults against a backing store. The only mutator of either table.
pub struct VmManager<P: ReplacementPolicy = LeastFaulted> {
    frame_table: FrameTable,
    spaces: AddressSpaceTable,
    policy: P,
    stats: VmStats,
}

impl VmManager<LeastFaulted> {
    pub fn new(num_frames: usize) -> Self {
        Self::with_policy(num_frames, LeastFaulted)
    }
}

impl<P: ReplacementPolicy> VmManager<P> {
    pub fn with_policy(num_frames: usize, policy: P) -> Self {
        VmManager {
            frame_table: FrameTable::new(num_frames),
            spaces: AddressSpaceTable::new(),
            policy,
            stats: VmStats::default(),
        }
    }

    pub fn frame_table(&self) -> &FrameTable {
        &self.frame_table
    }

    pub fn spaces(&self) -> &AddressSpaceTable {
        &self.spaces
    }

    pub fn stats(&self) -> VmStats {
        self.stats
    }

    /// Register an address space whose pages live in the given backing-store
    /// slots, one per virtual page, all non-resident. The slots must already
    /// hold the pages' initial contents.
    pub fn create_address_space(&mut self, slots: &[SwapSlot]) -> AsId {
        self.spaces.insert(AddressSpace::new(slots))
    }

    /// Tear an address space down, releasing any frames it still occupies.
    /// Returns the backing-store slots the space owned so the caller can
    /// free them on the swap device.
    pub fn destroy_address_space(&mut self, asid: AsId) -> Option<Vec<SwapSlot>> {
        let space = self.spaces.remove(asid)?;
        for entry in space.page_table.iter() {
            if let Some(frame) = entry.frame() {
                let page = self.frame_table.release(frame);
                assert_eq!(
                    page,
                    PageId {
                        asid,
                        vpn: entry.vpn()
                    },
                    "reverse mapping out of sync on frame {}",
                    frame
                );
            }
        }
        Some(space.page_table.iter().map(|e| e.swap_slot()).collect())
    }

    /// Resolve a page fault for `asid`. The faulting virtual address is
    /// taken from the machine's fault register; on success the page is
    /// resident and translation will succeed when the instruction retries.
    ///
    /// # Errors
    ///
    /// Addressing faults (no table entry for the page) and backing-store
    /// failures are fatal to the fault and surfaced to the caller; neither
    /// is retried here.
    pub fn handle_page_fault<S: BackingStore>(
        &mut self,
        machine: &mut Machine,
        store: &mut S,
        asid: AsId,
    ) -> Result<(), VmError> {
        let fault_addr = machine.fault_address();
        let vpn = fault_addr / PAGE_FRAME_SIZE;
        self.stats.page_faults += 1;

        let table_len = self
            .spaces
            .get(asid)
            .ok_or(VmError::UnknownAddressSpace(asid))?
            .page_table
            .len();
        if vpn >= table_len {
            return Err(VmError::AddressOutOfBounds { vpn, table_len });
        }

        let page = PageId { asid, vpn };
        let slot = {
            let entry = self.spaces.entry(page).expect("vpn bounds checked above");
            // A fault on a resident page cannot happen under the
            // one-fault-at-a-time model; translation would have succeeded.
            assert!(
                !entry.is_valid(),
                "page fault on resident page (asid {}, vpn {})",
                asid,
                vpn
            );
            entry.swap_slot()
        };

        match self.frame_table.find_free() {
            Some(frame) => self.direct_load(machine, store, page, slot, frame),
            None => self.evict_and_load(machine, store, page, slot),
        }
    }

    fn direct_load<S: BackingStore>(
        &mut self,
        machine: &mut Machine,
        store: &mut S,
        page: PageId,
        slot: SwapSlot,
        frame: FrameNum,
    ) -> Result<(), VmError> {
        self.frame_table.claim(frame, page);

        let mut incoming = [0u8; PAGE_FRAME_SIZE];
        store
            .read_page(slot, &mut incoming)
            .map_err(VmError::SwapRead)?;
        machine.frame_mut(frame).copy_from_slice(&incoming);

        let entry = self
            .spaces
            .entry_mut(page)
            .expect("faulting entry vanished during resolution");
        entry.install(frame);
        entry.bump_access();

        self.stats.direct_loads += 1;
        Ok(())
    }

    fn evict_and_load<S: BackingStore>(
        &mut self,
        machine: &mut Machine,
        store: &mut S,
        page: PageId,
        slot: SwapSlot,
    ) -> Result<(), VmError> {
        let victim_frame = {
            let VmManager {
                policy,
                frame_table,
                spaces,
                ..
            } = self;
            policy.select_victim(frame_table, spaces)
        };
        let victim_page = self
            .frame_table
            .occupant(victim_frame)
            .expect("selected victim frame is not occupied");
        let victim_slot = {
            let victim = self
                .spaces
                .entry(victim_page)
                .expect("victim has no page table entry");
            assert_eq!(
                victim.frame(),
                Some(victim_frame),
                "reverse mapping out of sync on frame {}",
                victim_frame
            );
            victim.swap_slot()
        };

        // The victim's bytes must be captured before the frame is
        // overwritten; reading them back from the frame afterwards would
        // silently persist the incoming page under the victim's slot.
        let mut victim_buf = [0u8; PAGE_FRAME_SIZE];
        victim_buf.copy_from_slice(machine.frame(victim_frame));

        let mut incoming = [0u8; PAGE_FRAME_SIZE];
        store
            .read_page(slot, &mut incoming)
            .map_err(VmError::SwapRead)?;
        machine.frame_mut(victim_frame).copy_from_slice(&incoming);
        store
            .write_page(victim_slot, &victim_buf)
            .map_err(VmError::SwapWrite)?;

        let victim = self
            .spaces
            .entry_mut(victim_page)
            .expect("victim entry vanished during resolution");
        victim.invalidate();
        victim.reset_access();

        self.frame_table.release(victim_frame);
        self.frame_table.claim(victim_frame, page);

        let entry = self
            .spaces
            .entry_mut(page)
            .expect("faulting entry vanished during resolution");
        entry.install(victim_frame);
        // Baseline of one fault event for the frame's new page, so the next
        // exhaustion does not immediately pick this frame again.
        entry.reset_access();

        self.stats.evictions += 1;
        Ok(())
    }
}
