//! Entry point into the kernel from user programs: syscall traps and the
//! exceptions the simulated CPU cannot handle on its own.

use super::syscall::{self, SystemServices};
use crate::mem::{AsId, VmError};
use crate::system::System;

/// Reasons control transfers back into the kernel from user code.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Exception {
    Syscall,
    PageFault,
    AddressError,
    BusError,
    Overflow,
    IllegalInstruction,
}

/// Dispatch one exception. Page faults resolve through the virtual-memory
/// subsystem and return silently so the faulting instruction can retry;
/// syscalls run through the thin wrapper layer. Anything else cannot be
/// recovered from here.
pub fn handle_exception(
    system: &mut System,
    services: &mut dyn SystemServices,
    which: Exception,
    asid: AsId,
) -> Result<(), VmError> {
    match which {
        Exception::Syscall => {
            syscall::handler(&mut system.machine, services);
            Ok(())
        }
        Exception::PageFault => system.page_fault(asid),
        _ => panic!("unexpected user mode exception {:?}", which),
    }
}
