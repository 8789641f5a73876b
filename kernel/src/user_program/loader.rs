use super::image::{self, ImageError};
use crate::mem::{AsId, VmManager};
use crate::swapping::{BackingStore, ReplacementPolicy, SwapDisk, SwapError, SwapSlot};
use core::error::Error;
use core::fmt::{Debug, Display, Formatter};

/// Error type for program loading
pub enum LoadError {
    /// The image bytes did not parse
    Image(ImageError),
    /// The swap device refused a slot allocation or a page write
    Swap(SwapError),
}

impl Debug for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            LoadError::Image(e) => write!(f, "Image({:?})", e),
            LoadError::Swap(e) => write!(f, "Swap({:?})", e),
        }
    }
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl Error for LoadError {}

impl From<ImageError> for LoadError {
    fn from(e: ImageError) -> Self {
        LoadError::Image(e)
    }
}

impl From<SwapError> for LoadError {
    fn from(e: SwapError) -> Self {
        LoadError::Swap(e)
    }
}

/// Stage every page of a program image into the backing store and register
/// the new address space. All entries start non-resident; the first touch of
/// each page faults it in. Returns the address-space id and the entry page.
pub fn load_program<P: ReplacementPolicy>(
    vm: &mut VmManager<P>,
    swap: &mut SwapDisk,
    image_bytes: &[u8],
) -> Result<(AsId, u32), LoadError> {
    let image = image::parse_image(image_bytes)?;

    let mut slots = Vec::with_capacity(image.pages.len());
    for page in &image.pages {
        let slot = match swap.allocate_slot() {
            Ok(slot) => slot,
            Err(e) => {
                release_slots(swap, &slots);
                return Err(e.into());
            }
        };
        if let Err(e) = swap.write_page(slot, page) {
            swap.free_slot(slot);
            release_slots(swap, &slots);
            return Err(e.into());
        }
        slots.push(slot);
    }

    let asid = vm.create_address_space(&slots);
    Ok((asid, image.entry_vpn))
}

fn release_slots(swap: &mut SwapDisk, slots: &[SwapSlot]) {
    for &slot in slots {
        swap.free_slot(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user_program::image::build_image;
    use osmos_shared::mem::PAGE_FRAME_SIZE;

    #[test]
    fn loading_stages_every_page_into_swap() {
        let mut vm = VmManager::new(2);
        let mut swap = SwapDisk::new(4);

        let first = vec![0x44; PAGE_FRAME_SIZE];
        let second = vec![0x55; PAGE_FRAME_SIZE];
        let bytes = build_image(0, &[&first, &second]);

        let (asid, entry_vpn) = load_program(&mut vm, &mut swap, &bytes).expect("load succeeds");
        assert_eq!(entry_vpn, 0);
        assert_eq!(swap.allocated_count(), 2);

        let table = vm.spaces().get(asid).expect("space exists").page_table();
        assert_eq!(table.len(), 2);
        for (vpn, fill) in [(0, 0x44u8), (1, 0x55)] {
            let entry = table.get(vpn).expect("entry exists");
            assert!(!entry.is_valid());
            let mut buf = [0u8; PAGE_FRAME_SIZE];
            swap.read_page(entry.swap_slot(), &mut buf)
                .expect("slot readable");
            assert!(buf.iter().all(|&b| b == fill));
        }
    }

    #[test]
    fn a_full_swap_device_fails_the_load_cleanly() {
        let mut vm = VmManager::new(1);
        let mut swap = SwapDisk::new(1);

        let first = vec![0; PAGE_FRAME_SIZE];
        let second = vec![0; PAGE_FRAME_SIZE];
        let bytes = build_image(0, &[&first, &second]);

        let err = load_program(&mut vm, &mut swap, &bytes).expect_err("load must fail");
        assert!(matches!(err, LoadError::Swap(SwapError::Full)));
        // The slot claimed before the failure was given back.
        assert_eq!(swap.allocated_count(), 0);
    }

    #[test]
    fn garbage_bytes_fail_the_load() {
        let mut vm = VmManager::new(1);
        let mut swap = SwapDisk::new(1);
        let err = load_program(&mut vm, &mut swap, b"not an image").expect_err("load must fail");
        assert!(matches!(err, LoadError::Image(ImageError::BadMagic)));
    }
}
