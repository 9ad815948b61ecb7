// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`lz_flash::FlashRegion`] backed by the LPC55's boot ROM flash driver.
//!
//! Erase and program both go through `lpc55_romapi::flash_erase`/
//! `flash_write`, the same ROM API calls `hypo.rs`'s `__write_to_flash`
//! makes on this platform, rather than sequencing the flash controller's
//! registers directly — the ROM driver already handles the ready-flag
//! polling, the erase key, and the per-row latch-then-program steps for
//! a given chip revision. Reads go straight through the memory-mapped
//! flash address space instead of a ROM read call, since the chip runs
//! code out of the same flash it's reading.

use lpc55_romapi::FlashStatus;
use lz_flash::{FlashError, FlashRegion, Region, FLASH_PAGE_SIZE};

/// Fixed physical base address and length of one [`Region`]. Populated from
/// the platform's linker script; see `memory.x`.
pub struct Extent {
    base: usize,
    len: usize,
}

/// Reads the six regions' base addresses and lengths out of symbols the
/// linker script defines, in [`lz_flash::ALL_REGIONS`] order. Mirrors the
/// `address_of_*` extern-symbol convention used elsewhere on this platform
/// to hand a Rust type a linker-script-fixed address without a raw literal
/// in the source.
pub fn linker_extents() -> [Extent; 6] {
    extern "C" {
        static address_of_data_store: u32;
        static address_of_data_store_end: u32;
        static address_of_staging: u32;
        static address_of_staging_end: u32;
        static address_of_boot_param_window: u32;
        static address_of_boot_param_window_end: u32;
        static address_of_cpatcher_image: u32;
        static address_of_cpatcher_image_end: u32;
        static address_of_udownloader_image: u32;
        static address_of_udownloader_image_end: u32;
        static address_of_app_image: u32;
        static address_of_app_image_end: u32;
    }

    // SAFETY: these symbols are defined by `memory.x` as zero-sized markers
    // bracketing each region; only their addresses are read, never their
    // (nonexistent) contents.
    unsafe fn extent(start: &u32, end: &u32) -> Extent {
        let base = start as *const u32 as usize;
        let end = end as *const u32 as usize;
        Extent { base, len: end - base }
    }

    unsafe {
        [
            extent(&address_of_data_store, &address_of_data_store_end),
            extent(&address_of_staging, &address_of_staging_end),
            extent(&address_of_boot_param_window, &address_of_boot_param_window_end),
            extent(&address_of_cpatcher_image, &address_of_cpatcher_image_end),
            extent(&address_of_udownloader_image, &address_of_udownloader_image_end),
            extent(&address_of_app_image, &address_of_app_image_end),
        ]
    }
}

fn from_flash_status(status: FlashStatus, on_err: FlashError) -> Result<(), FlashError> {
    match status {
        FlashStatus::Success => Ok(()),
        _ => Err(on_err),
    }
}

/// The six flash regions the decision engine reads and writes, addressed by
/// base address rather than by a `HashMap` as the host-side double does —
/// there is no allocator here.
pub struct McuFlash {
    extents: [Extent; 6],
}

impl McuFlash {
    /// # Safety
    /// `extents` must describe non-overlapping ranges that are actually
    /// backed by this chip's flash, page-aligned per the linker script, per
    /// the ROM API's own alignment contract.
    pub unsafe fn new(extents: [Extent; 6]) -> Self {
        McuFlash { extents }
    }

    fn extent(&self, region: Region) -> &Extent {
        &self.extents[region as usize]
    }

    fn region_ptr(&self, region: Region) -> *const u8 {
        self.extent(region).base as *const u8
    }

    fn erase(&self, addr: u32, len: u32) -> Result<(), FlashError> {
        // SAFETY: `addr`/`len` describe a range within this chip's flash, per
        // the linker script; the ROM driver itself enforces page alignment.
        match unsafe { lpc55_romapi::flash_erase(addr, len) } {
            Ok(()) => Ok(()),
            Err(status) => from_flash_status(status, FlashError::EraseFailed),
        }
    }

    fn program(&self, addr: u32, buffer: &mut [u8]) -> Result<(), FlashError> {
        // SAFETY: `addr` is within this chip's flash and the page it starts
        // has just been erased; `buffer` is a full, page-sized RAM copy.
        match unsafe { lpc55_romapi::flash_write(addr, buffer.as_mut_ptr(), buffer.len() as u32) } {
            Ok(()) => Ok(()),
            Err(status) => from_flash_status(status, FlashError::ProgramFailed),
        }
    }
}

impl FlashRegion for McuFlash {
    fn region_len(&self, region: Region) -> usize {
        self.extent(region).len
    }

    fn read(&self, region: Region, offset: usize, buf: &mut [u8]) -> Result<(), FlashError> {
        let extent = self.extent(region);
        if offset.checked_add(buf.len()).ok_or(FlashError::OutOfBounds)? > extent.len {
            return Err(FlashError::OutOfBounds);
        }
        // SAFETY: `extent` describes a range of this chip's memory-mapped,
        // readable flash; `offset + buf.len()` was just bounds-checked.
        let src = unsafe { core::slice::from_raw_parts(self.region_ptr(region).add(offset), buf.len()) };
        buf.copy_from_slice(src);
        Ok(())
    }

    fn as_slice(&self, region: Region) -> &[u8] {
        let extent = self.extent(region);
        // SAFETY: flash is execute-in-place; `extent` is this region's whole,
        // readable span as set up by the linker script.
        unsafe { core::slice::from_raw_parts(self.region_ptr(region), extent.len) }
    }

    fn write(&mut self, region: Region, offset: usize, bytes: &[u8]) -> Result<(), FlashError> {
        let extent = self.extent(region);
        let end = offset.checked_add(bytes.len()).ok_or(FlashError::OutOfBounds)?;
        if end > extent.len {
            return Err(FlashError::OutOfBounds);
        }

        let base = extent.base;
        let first_page = offset / FLASH_PAGE_SIZE;
        let last_page = (end - 1) / FLASH_PAGE_SIZE;

        for page_idx in first_page..=last_page {
            let page_base = base + page_idx * FLASH_PAGE_SIZE;
            let mut page = [0xFFu8; FLASH_PAGE_SIZE];
            // SAFETY: reading back the existing page before erasing preserves
            // any bytes in this page outside [offset, end).
            let existing = unsafe { core::slice::from_raw_parts(page_base as *const u8, FLASH_PAGE_SIZE) };
            page.copy_from_slice(existing);

            let page_start_abs = page_base - base;
            let page_end_abs = page_start_abs + FLASH_PAGE_SIZE;
            let overlap_start = offset.max(page_start_abs);
            let overlap_end = end.min(page_end_abs);
            page[overlap_start - page_start_abs..overlap_end - page_start_abs]
                .copy_from_slice(&bytes[overlap_start - offset..overlap_end - offset]);

            self.erase(page_base as u32, FLASH_PAGE_SIZE as u32)?;
            self.program(page_base as u32, &mut page)?;
        }
        Ok(())
    }

    fn erase_region(&mut self, region: Region) -> Result<(), FlashError> {
        let extent = self.extent(region);
        self.erase(extent.base as u32, extent.len as u32)
    }
}
