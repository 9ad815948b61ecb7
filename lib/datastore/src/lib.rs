// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The persistent data store: trust anchors followed by config data, laid
//! out as one fixed-layout `#[repr(C)]` structure occupying [`Region::DataStore`].
//!
//! Every mutation follows the flash region's "read-modify-write a RAM copy,
//! then write the whole structure back" discipline (§4.1 of the design):
//! callers load a [`DataStore`], mutate the owned copy, then call
//! [`DataStore::save`] once. There is no API for patching a single field in
//! place on flash.

#![cfg_attr(not(test), no_std)]

use lz_config::{CertSlot, LZ_MAGIC};
use lz_crypto::PublicKey;
use lz_flash::{FlashError, FlashRegion, Region};
use lz_handoff::ImageCertStore;
use lz_image::ImageMetadata;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Maximum encoded size of one PEM-wrapped SEC1 public key we persist.
pub const MAX_KEY_PEM_LEN: usize = 192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStoreError {
    /// The data store region held fewer bytes than `size_of::<DataStore>()`.
    Truncated,
    /// A stored PEM key was too long to fit [`MAX_KEY_PEM_LEN`], or an empty
    /// slot was queried as if it held a key.
    NoKey,
    /// The stored PEM did not decode to a valid public key.
    BadKey,
    Flash(FlashError),
}

impl From<FlashError> for DataStoreError {
    fn from(e: FlashError) -> Self {
        DataStoreError::Flash(e)
    }
}

/// A fixed-capacity slot for one PEM-encoded public key. `len == 0` means
/// the slot is empty (the all-zero/initial state).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct PemKeySlot {
    len: u16,
    _pad: [u8; 2],
    bytes: [u8; MAX_KEY_PEM_LEN],
}

impl PemKeySlot {
    pub fn empty() -> Self {
        PemKeySlot {
            len: 0,
            _pad: [0; 2],
            bytes: [0u8; MAX_KEY_PEM_LEN],
        }
    }

    pub fn set(&mut self, pem: &str) -> Result<(), DataStoreError> {
        let src = pem.as_bytes();
        if src.len() > self.bytes.len() {
            return Err(DataStoreError::NoKey);
        }
        self.bytes = [0u8; MAX_KEY_PEM_LEN];
        self.bytes[..src.len()].copy_from_slice(src);
        self.len = src.len() as u16;
        Ok(())
    }

    pub fn as_str(&self) -> Result<&str, DataStoreError> {
        if self.len == 0 {
            return Err(DataStoreError::NoKey);
        }
        core::str::from_utf8(&self.bytes[..self.len as usize]).map_err(|_| DataStoreError::BadKey)
    }

    /// Decodes the stored PEM into a [`PublicKey`], if the slot is occupied.
    pub fn public_key(&self) -> Result<Option<PublicKey>, DataStoreError> {
        if self.len == 0 {
            return Ok(None);
        }
        PublicKey::from_pem(self.as_str()?)
            .map(Some)
            .map_err(|_| DataStoreError::BadKey)
    }
}

/// Persistent trust anchors: the three keys the boot decision engine trusts,
/// and the certificate bag backing the DeviceID CSR/cert chain.
///
/// *Invariant*: `magic == LZ_MAGIC` iff this record has been provisioned.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct TrustAnchors {
    pub magic: u32,
    _pad: u32,
    pub deviceid_pub: PemKeySlot,
    pub management_pub: PemKeySlot,
    pub code_authority_pub: PemKeySlot,
    /// Backs the Hub and DeviceID slots; the AliasID slot is never
    /// populated here (AliasID is re-derived, never persisted).
    pub cert_bag: ImageCertStore,
}

impl TrustAnchors {
    pub fn erased() -> Self {
        TrustAnchors {
            magic: 0,
            _pad: 0,
            deviceid_pub: PemKeySlot::empty(),
            management_pub: PemKeySlot::empty(),
            code_authority_pub: PemKeySlot::empty(),
            cert_bag: ImageCertStore::empty(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == LZ_MAGIC
    }

    pub fn hub_cert(&self) -> Option<&[u8]> {
        self.cert_bag.get(CertSlot::Hub)
    }

    pub fn deviceid_cert(&self) -> Option<&[u8]> {
        self.cert_bag.get(CertSlot::DeviceId)
    }
}

/// Optional network provisioning data. `magic == LZ_MAGIC` iff present.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct NwInfo {
    pub magic: u32,
    pub ssid_len: u16,
    pub psk_len: u16,
    pub ssid: [u8; 32],
    pub psk: [u8; 64],
}

impl NwInfo {
    pub fn absent() -> Self {
        NwInfo {
            magic: 0,
            ssid_len: 0,
            psk_len: 0,
            ssid: [0; 32],
            psk: [0; 64],
        }
    }

    pub fn is_present(&self) -> bool {
        self.magic == LZ_MAGIC
    }
}

/// The one-time provisioning secret and the UUID it's bound to.
///
/// *Invariant*: `static_symm` is all-zero on any boot after the first
/// (§3, §8 property 8).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct StaticSymmInfo {
    pub magic: u32,
    pub static_symm: [u8; 32],
    pub dev_uuid: [u8; 16],
}

impl StaticSymmInfo {
    pub fn empty() -> Self {
        StaticSymmInfo {
            magic: 0,
            static_symm: [0; 32],
            dev_uuid: [0; 16],
        }
    }

    pub fn wipe_secret(&mut self) {
        self.static_symm = [0u8; 32];
    }
}

/// Indexes [`ConfigData::img_info`]. Deliberately excludes the core image:
/// the core has no separate anti-rollback record because it can only ever
/// be replaced wholesale by the core-patcher, which is itself one of these
/// three tracked images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ImgSlot {
    CorePatcher = 0,
    UpdateDownloader = 1,
    App = 2,
}

pub const IMG_SLOTS: usize = 3;

/// Config data: network credentials, the one-time provisioning secret, and
/// per-image anti-rollback metadata.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ConfigData {
    pub nw_info: NwInfo,
    pub static_symm_info: StaticSymmInfo,
    pub img_info: [ImageMetadata; IMG_SLOTS],
}

impl ConfigData {
    pub fn erased() -> Self {
        ConfigData {
            nw_info: NwInfo::absent(),
            static_symm_info: StaticSymmInfo::empty(),
            img_info: [ImageMetadata::initial(); IMG_SLOTS],
        }
    }

    pub fn metadata(&self, slot: ImgSlot) -> &ImageMetadata {
        &self.img_info[slot as usize]
    }

    pub fn metadata_mut(&mut self, slot: ImgSlot) -> &mut ImageMetadata {
        &mut self.img_info[slot as usize]
    }
}

/// The whole persisted data store: trust anchors immediately followed by
/// config data, matching the platform linker script's fixed offsets.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DataStore {
    pub trust_anchors: TrustAnchors,
    pub config: ConfigData,
}

impl DataStore {
    pub fn erased() -> Self {
        DataStore {
            trust_anchors: TrustAnchors::erased(),
            config: ConfigData::erased(),
        }
    }

    /// Loads the whole data store out of `flash`, returning an all-erased
    /// value (not an error) if the region reads back as unprovisioned.
    pub fn load(flash: &impl FlashRegion) -> Result<DataStore, DataStoreError> {
        let len = core::mem::size_of::<DataStore>();
        if flash.region_len(Region::DataStore) < len {
            return Err(DataStoreError::Truncated);
        }
        let mut buf = [0u8; core::mem::size_of::<DataStore>()];
        flash.read(Region::DataStore, 0, &mut buf)?;
        DataStore::read_from_bytes(&buf).map_err(|_| DataStoreError::Truncated)
    }

    /// Writes the whole structure back in one page-granular write, per the
    /// "no partial in-place mutation" rule.
    pub fn save(&self, flash: &mut impl FlashRegion) -> Result<(), DataStoreError> {
        flash.write(Region::DataStore, 0, self.as_bytes())?;
        Ok(())
    }

    pub fn erase(flash: &mut impl FlashRegion) -> Result<(), DataStoreError> {
        flash.erase_region(Region::DataStore)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lz_crypto::{sha256, Keypair};
    use lz_flash::mock::InMemoryFlash;

    fn flash() -> InMemoryFlash {
        InMemoryFlash::new(core::mem::size_of::<DataStore>(), 4096, 256)
    }

    #[test]
    fn erased_store_round_trips_through_flash() {
        let mut flash = flash();
        let store = DataStore::erased();
        store.save(&mut flash).unwrap();
        let loaded = DataStore::load(&flash).unwrap();
        assert!(!loaded.trust_anchors.is_valid());
    }

    #[test]
    fn pem_key_slot_round_trips_a_public_key() {
        let kp = Keypair::derive(&sha256(b"management key")).unwrap();
        let mut pem_buf = [0u8; 256];
        let pem = kp.public_key().to_pem(&mut pem_buf).unwrap();

        let mut slot = PemKeySlot::empty();
        slot.set(pem).unwrap();
        let decoded = slot.public_key().unwrap().unwrap();
        assert_eq!(decoded.to_sec1_bytes(), kp.public_key().to_sec1_bytes());
    }

    #[test]
    fn static_symm_wipes_to_all_zero() {
        let mut info = StaticSymmInfo {
            magic: LZ_MAGIC,
            static_symm: [0x11; 32],
            dev_uuid: [0; 16],
        };
        info.wipe_secret();
        assert_eq!(info.static_symm, [0u8; 32]);
    }

    #[test]
    fn provisioned_store_survives_a_round_trip() {
        let mut flash = flash();
        let mut store = DataStore::erased();
        store.trust_anchors.magic = LZ_MAGIC;
        let mgmt = Keypair::derive(&sha256(b"management key")).unwrap();
        let mut pem_buf = [0u8; 256];
        let pem = mgmt.public_key().to_pem(&mut pem_buf).unwrap();
        store.trust_anchors.management_pub.set(pem).unwrap();
        store.save(&mut flash).unwrap();

        let loaded = DataStore::load(&flash).unwrap();
        assert!(loaded.trust_anchors.is_valid());
        let reloaded_key = loaded.trust_anchors.management_pub.public_key().unwrap().unwrap();
        assert_eq!(reloaded_key.to_sec1_bytes(), mgmt.public_key().to_sec1_bytes());
    }
}
