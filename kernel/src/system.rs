use crate::machine::Machine;
use crate::mem::{AsId, VmError, VmManager};
use crate::swapping::SwapDisk;
use crate::user_program::loader::{self, LoadError};

/// Everything the simulated kernel owns: the machine, the swap device, and
/// the virtual-memory manager. Built per simulation run and passed around
/// by reference; there is no global instance.
pub struct System {
    pub machine: Machine,
    pub swap: SwapDisk,
    pub vm: VmManager,
}

impl System {
    pub fn new(num_frames: usize, swap_slots: usize) -> Self {
        System {
            machine: Machine::new(num_frames),
            swap: SwapDisk::new(swap_slots),
            vm: VmManager::new(num_frames),
        }
    }

    /// Stage a program image into swap and register its address space.
    pub fn load_program(&mut self, image_bytes: &[u8]) -> Result<(AsId, u32), LoadError> {
        loader::load_program(&mut self.vm, &mut self.swap, image_bytes)
    }

    /// Resolve the page fault recorded in the machine's fault register.
    pub fn page_fault(&mut self, asid: AsId) -> Result<(), VmError> {
        let System { machine, swap, vm } = self;
        vm.handle_page_fault(machine, swap, asid)
    }

    /// Record `addr` as the faulting address, then resolve the fault.
    pub fn page_fault_at(&mut self, asid: AsId, addr: usize) -> Result<(), VmError> {
        self.machine.set_fault_address(addr);
        self.page_fault(asid)
    }

    /// Tear down an address space, returning its frames and swap slots.
    pub fn exit_process(&mut self, asid: AsId) {
        if let Some(slots) = self.vm.destroy_address_space(asid) {
            for slot in slots {
                self.swap.free_slot(slot);
            }
        }
    }
}
