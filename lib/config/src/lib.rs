// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed sizes, magic values, and other constants shared across the trusted
//! boot kernel. Every crate that needs one of these imports it from here
//! rather than re-declaring it.

#![cfg_attr(not(test), no_std)]

/// Sentinel written into every persisted or handed-off structure's `magic`
/// field once it has been initialized. Erased flash reads back as all-0xFF,
/// which never equals this value.
pub const LZ_MAGIC: u32 = 0x4c41_5a52; // "LAZR"

/// Flash erase/program granularity, in bytes.
pub const FLASH_PAGE_SIZE: usize = 512;

/// Number of pages reserved for the staging area.
pub const LZ_STAGING_AREA_NUM_PAGES: usize = 16;
pub const LZ_STAGING_AREA_SIZE: usize = LZ_STAGING_AREA_NUM_PAGES * FLASH_PAGE_SIZE;

/// Watchdog deferral used when no `DEFERRAL_TICKET` is present in staging.
pub const DEFAULT_WDT_TIMEOUT_S: u32 = 60;

/// Width, in bytes, of every digest, seed, and symmetric key in this system.
/// SHA-256 digests, HMAC-SHA-256 tags, and derived seeds are all this size.
pub const DIGEST_LEN: usize = 32;

/// Slots in a certificate table's (start, size) index.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertSlot {
    Hub = 0,
    DeviceId = 1,
    AliasId = 2,
}

/// Number of slots in the data-store trust-anchor cert table. The next-layer
/// cert store uses all three; the persisted trust-anchor store only ever
/// populates Hub and DeviceId (AliasId is re-derived each boot).
pub const CERT_TABLE_SLOTS: usize = 3;

/// Maximum encoded size of a single certificate or CSR we build, in bytes.
/// Our DER templates are small (single EC public key, one CN attribute, one
/// optional FWID extension) so this is generous headroom, not a tight fit.
pub const MAX_CERT_LEN: usize = 512;

/// Maximum total size of the concatenated, null-terminated cert bag carried
/// in the data store and in the next-layer cert store.
pub const CERT_BAG_LEN: usize = CERT_TABLE_SLOTS * MAX_CERT_LEN;
