//! Demo run: boot a two-frame machine, load a three-page program, and walk
//! it through enough touches to force an eviction.

use osmos::machine::{ARG1_REG, RET_REG};
use osmos::system::System;
use osmos::user_program::exception::{handle_exception, Exception};
use osmos::user_program::image::build_image;
use osmos::user_program::syscall::{ConsoleServices, SC_PRINT_INT};
use osmos_shared::mem::PAGE_FRAME_SIZE;
use osmos_shared::println;

fn main() {
    println!("OsmOS: bringing up the paging simulator");
    let mut system = System::new(2, 8);

    let pages: Vec<Vec<u8>> = (0..3)
        .map(|vpn| vec![0xA0 + vpn as u8; PAGE_FRAME_SIZE])
        .collect();
    let refs: Vec<&[u8]> = pages.iter().map(|p| p.as_slice()).collect();
    let image = build_image(0, &refs);

    let (asid, entry_vpn) = system.load_program(&image).expect("program load failed");
    println!(
        "loaded {} pages as address space {} (entry page {})",
        pages.len(),
        asid,
        entry_vpn
    );

    let mut services = ConsoleServices::default();

    // Two direct loads fill the machine; the third touch must evict, and
    // re-touching page 0 faults it back in.
    for vpn in [0usize, 1, 2, 0] {
        let addr = vpn * PAGE_FRAME_SIZE;
        system.machine.set_fault_address(addr);
        handle_exception(&mut system, &mut services, Exception::PageFault, asid)
            .expect("fault resolution failed");
        println!("touched page {} at {:#X}", vpn, addr);
    }

    system.machine.write_register(RET_REG, SC_PRINT_INT);
    system.machine.write_register(ARG1_REG, 42);
    handle_exception(&mut system, &mut services, Exception::Syscall, asid)
        .expect("syscall dispatch failed");

    let stats = system.vm.stats();
    println!(
        "page faults: {} ({} direct loads, {} evictions)",
        stats.page_faults, stats.direct_loads, stats.evictions
    );

    system.exit_process(asid);
    println!("address space {} torn down", asid);
}
