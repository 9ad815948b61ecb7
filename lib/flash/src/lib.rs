// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Page-granular, write-through flash region abstraction.
//!
//! The decision engine never talks to a flash controller directly. It talks
//! to a [`FlashRegion`] implementation, which lets the same engine run
//! against real hardware or, host-side, against [`mock::InMemoryFlash`].
//!
//! Every persisted structure is updated by the "read-modify-write a full
//! in-RAM copy, then write the whole thing back" discipline: there is no
//! partial in-place mutation. At page granularity this gives "either old or
//! new" semantics across a power loss; a torn write can only ever corrupt
//! the single page being rewritten, and that page belongs to a structure
//! whose `magic` check already distinguishes valid-and-current from
//! everything else.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub use lz_config::FLASH_PAGE_SIZE;

/// A fixed-purpose, contiguous flash range the engine reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    DataStore,
    Staging,
    BootParamWindow,
    CorePatcherImage,
    UpdateDownloaderImage,
    AppImage,
}

/// All regions a fresh [`mock::InMemoryFlash`] needs sized up front.
pub const ALL_REGIONS: [Region; 6] = [
    Region::DataStore,
    Region::Staging,
    Region::BootParamWindow,
    Region::CorePatcherImage,
    Region::UpdateDownloaderImage,
    Region::AppImage,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// `offset + bytes.len()` falls outside the region.
    OutOfBounds,
    /// The underlying programmer reported a failure.
    ProgramFailed,
    /// An erase covering the requested range failed.
    EraseFailed,
}

/// Page-granular, write-through access to one or more fixed flash regions.
///
/// Implementations erase-then-program at page granularity; callers are
/// expected to stage a full copy of a structure in RAM and call [`write`]
/// once rather than patching bytes in place.
///
/// [`write`]: FlashRegion::write
pub trait FlashRegion {
    /// Total size, in bytes, of `region`.
    fn region_len(&self, region: Region) -> usize;

    /// Reads `buf.len()` bytes starting at `offset` within `region`.
    fn read(&self, region: Region, offset: usize, buf: &mut [u8]) -> Result<(), FlashError>;

    /// Borrows the whole of `region` directly. Flash is execute-in-place on
    /// the reference hardware, so a multi-kilobyte image is verified by
    /// reading through this borrow rather than copied into RAM first.
    fn as_slice(&self, region: Region) -> &[u8];

    /// Erases and reprograms the pages spanned by `[offset, offset +
    /// bytes.len())` within `region` with `bytes`. Any bytes in a spanned
    /// page outside the requested range are preserved by the implementation
    /// re-reading them before erasing, unless `bytes` covers whole pages.
    fn write(&mut self, region: Region, offset: usize, bytes: &[u8]) -> Result<(), FlashError>;

    /// Erases `region` in its entirety to the all-0xFF pattern.
    fn erase_region(&mut self, region: Region) -> Result<(), FlashError>;
}

/// Rounds `len` up to the next multiple of [`FLASH_PAGE_SIZE`].
pub const fn page_align(len: usize) -> usize {
    (len + FLASH_PAGE_SIZE - 1) / FLASH_PAGE_SIZE * FLASH_PAGE_SIZE
}

fn check_bounds(region_len: usize, offset: usize, len: usize) -> Result<(), FlashError> {
    let end = offset.checked_add(len).ok_or(FlashError::OutOfBounds)?;
    if end > region_len {
        return Err(FlashError::OutOfBounds);
    }
    Ok(())
}

/// A host-side, in-memory double of [`FlashRegion`], used by unit and
/// integration tests so the engine can be exercised without hardware.
#[cfg(any(test, feature = "std"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;

    pub struct InMemoryFlash {
        regions: HashMap<Region, Vec<u8>>,
    }

    impl InMemoryFlash {
        /// Convenience constructor sizing only `DataStore`/`Staging`/
        /// `BootParamWindow`; the image regions default to 64 KiB each,
        /// which is plenty for the small fixture images used in tests.
        pub fn new(data_store_len: usize, staging_len: usize, boot_param_len: usize) -> Self {
            Self::with_sizes(&[
                (Region::DataStore, data_store_len),
                (Region::Staging, staging_len),
                (Region::BootParamWindow, boot_param_len),
                (Region::CorePatcherImage, 64 * 1024),
                (Region::UpdateDownloaderImage, 64 * 1024),
                (Region::AppImage, 64 * 1024),
            ])
        }

        pub fn with_sizes(sizes: &[(Region, usize)]) -> Self {
            let mut regions = HashMap::new();
            for (region, len) in sizes {
                regions.insert(*region, vec![0xFFu8; *len]);
            }
            InMemoryFlash { regions }
        }

        fn get(&self, region: Region) -> &Vec<u8> {
            self.regions
                .get(&region)
                .expect("mock flash not initialized for this region")
        }

        fn get_mut(&mut self, region: Region) -> &mut Vec<u8> {
            self.regions
                .get_mut(&region)
                .expect("mock flash not initialized for this region")
        }
    }

    impl FlashRegion for InMemoryFlash {
        fn region_len(&self, region: Region) -> usize {
            self.get(region).len()
        }

        fn read(&self, region: Region, offset: usize, buf: &mut [u8]) -> Result<(), FlashError> {
            let data = self.get(region);
            check_bounds(data.len(), offset, buf.len())?;
            buf.copy_from_slice(&data[offset..offset + buf.len()]);
            Ok(())
        }

        fn as_slice(&self, region: Region) -> &[u8] {
            self.get(region)
        }

        fn write(
            &mut self,
            region: Region,
            offset: usize,
            bytes: &[u8],
        ) -> Result<(), FlashError> {
            let len = self.region_len(region);
            check_bounds(len, offset, bytes.len())?;
            let data = self.get_mut(region);
            data[offset..offset + bytes.len()].copy_from_slice(bytes);
            Ok(())
        }

        fn erase_region(&mut self, region: Region) -> Result<(), FlashError> {
            let data = self.get_mut(region);
            data.iter_mut().for_each(|b| *b = 0xFF);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::InMemoryFlash;
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut flash = InMemoryFlash::new(4096, 8192, 256);
        flash.write(Region::DataStore, 16, b"hello").unwrap();
        let mut buf = [0u8; 5];
        flash.read(Region::DataStore, 16, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn out_of_bounds_write_is_rejected() {
        let mut flash = InMemoryFlash::new(64, 64, 64);
        let result = flash.write(Region::DataStore, 60, &[0u8; 16]);
        assert_eq!(result, Err(FlashError::OutOfBounds));
    }

    #[test]
    fn erase_region_resets_to_all_ff() {
        let mut flash = InMemoryFlash::new(32, 32, 32);
        flash.write(Region::Staging, 0, &[0x42; 4]).unwrap();
        flash.erase_region(Region::Staging).unwrap();
        let mut buf = [0u8; 4];
        flash.read(Region::Staging, 0, &mut buf).unwrap();
        assert_eq!(buf, [0xFF; 4]);
    }

    #[test]
    fn page_align_rounds_up() {
        assert_eq!(page_align(1), FLASH_PAGE_SIZE);
        assert_eq!(page_align(FLASH_PAGE_SIZE), FLASH_PAGE_SIZE);
        assert_eq!(page_align(FLASH_PAGE_SIZE + 1), FLASH_PAGE_SIZE * 2);
    }
}
