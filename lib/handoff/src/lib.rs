// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Boot-parameter RAM windows and the next-layer provisioner.
//!
//! Two RAM structures cross the trust boundary: the input boot parameters
//! written by the pre-boot stage, and the output boot parameters (plus a
//! freshly assembled certificate store) this kernel hands to the next
//! layer. On the reference hardware the two windows overlap, so the output
//! side is modeled as an explicit two-step `build()` then `commit()` API:
//! nothing about the destination window is touched until `commit`, and
//! `commit` always zeroizes the window before writing, so the ordering
//! can't be accidentally swapped by a caller.

#![cfg_attr(not(test), no_std)]

use hubpack::SerializedSize;
use lz_config::{CertSlot, CERT_BAG_LEN, CERT_TABLE_SLOTS, LZ_MAGIC};
use serde::{Deserialize, Serialize};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffError {
    BadMagic,
    Truncated,
    CertBagFull,
    EncodeFailed,
}

/// The fixed-layout boot parameters the pre-boot stage hands to this
/// kernel. 8-byte-aligned fields, in the order the hardware expects.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawBootParams {
    pub magic: u32,
    pub _pad0: u32,
    pub cdi_prime: [u8; 32],
    pub dev_uuid: [u8; 16],
    pub core_auth: [u8; 32],
    pub cur_nonce: u32,
    pub next_nonce: u32,
    pub static_symm: [u8; 32],
    pub initial_boot: u32,
}

/// The validated, owned form of [`RawBootParams`]. Secret fields are kept in
/// [`Zeroizing`] buffers so every exit path, including an early `?`, scrubs
/// them once this value is dropped.
pub struct BootParams {
    pub cdi_prime: Zeroizing<[u8; 32]>,
    pub dev_uuid: [u8; 16],
    pub core_auth: Zeroizing<[u8; 32]>,
    pub cur_nonce: u32,
    pub next_nonce: u32,
    pub static_symm: Option<Zeroizing<[u8; 32]>>,
    pub initial_boot: bool,
}

impl BootParams {
    /// Validates and copies a [`RawBootParams`] out of the fixed RAM
    /// address it lives at. The caller is expected to zeroize that RAM
    /// once this returns, successfully or not.
    pub fn parse(bytes: &[u8]) -> Result<BootParams, HandoffError> {
        let raw = RawBootParams::ref_from_prefix(bytes)
            .map(|(raw, _rest)| raw)
            .map_err(|_| HandoffError::Truncated)?;
        if raw.magic != LZ_MAGIC {
            return Err(HandoffError::BadMagic);
        }
        let static_symm_all_zero = raw.static_symm == [0u8; 32];
        Ok(BootParams {
            cdi_prime: Zeroizing::new(raw.cdi_prime),
            dev_uuid: raw.dev_uuid,
            core_auth: Zeroizing::new(raw.core_auth),
            cur_nonce: raw.cur_nonce,
            next_nonce: raw.next_nonce,
            static_symm: (!static_symm_all_zero).then(|| Zeroizing::new(raw.static_symm)),
            initial_boot: raw.initial_boot != 0,
        })
    }
}

/// Appended to the next layer's RAM window: a freshly derived AliasID, a
/// need-to-know-filtered subset of device data, and the two "please do
/// something" booleans the application/downloader read.
#[derive(Debug, Clone, Serialize, Deserialize, SerializedSize)]
pub struct NextLayerBootParams {
    pub alias_priv_pem_len: u16,
    pub alias_priv_pem: [u8; 256],
    pub alias_pub_pem_len: u16,
    pub alias_pub_pem: [u8; 256],
    pub dev_uuid: [u8; 16],
    pub next_nonce: Option<u32>,
    pub cur_nonce: Option<u32>,
    pub dev_auth: Option<[u8; 32]>,
    pub dev_reassociation_necessary: Option<bool>,
    pub firmware_update_necessary: Option<bool>,
    pub nw_data: Option<[u8; 64]>,
}

/// The three boot modes the selector can choose, reused here purely to
/// drive the next-layer need-to-know filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    App,
    UpdateDownloader,
    CorePatcher,
}

/// Fills in exactly the fields a layer running in `mode` is entitled to see.
/// The application never receives `cur_nonce`, `dev_auth`, or network
/// credentials: it cannot impersonate the device to the management service
/// or request a re-association.
#[allow(clippy::too_many_arguments)]
pub fn provision(
    mode: BootMode,
    alias_priv_pem: &str,
    alias_pub_pem: &str,
    dev_uuid: [u8; 16],
    next_nonce: u32,
    cur_nonce: u32,
    dev_auth: [u8; 32],
    dev_reassociation_necessary: bool,
    firmware_update_necessary: bool,
    nw_data: Option<[u8; 64]>,
) -> NextLayerBootParams {
    let mut alias_priv_buf = [0u8; 256];
    let priv_bytes = alias_priv_pem.as_bytes();
    alias_priv_buf[..priv_bytes.len()].copy_from_slice(priv_bytes);
    let mut alias_pub_buf = [0u8; 256];
    let pub_bytes = alias_pub_pem.as_bytes();
    alias_pub_buf[..pub_bytes.len()].copy_from_slice(pub_bytes);

    let recovery_layer = matches!(mode, BootMode::UpdateDownloader | BootMode::CorePatcher);

    NextLayerBootParams {
        alias_priv_pem_len: priv_bytes.len() as u16,
        alias_priv_pem: alias_priv_buf,
        alias_pub_pem_len: pub_bytes.len() as u16,
        alias_pub_pem: alias_pub_buf,
        dev_uuid,
        next_nonce: matches!(mode, BootMode::App | BootMode::UpdateDownloader).then_some(next_nonce),
        cur_nonce: recovery_layer.then_some(cur_nonce),
        dev_auth: recovery_layer.then_some(dev_auth),
        dev_reassociation_necessary: recovery_layer.then_some(dev_reassociation_necessary),
        firmware_update_necessary: recovery_layer.then_some(firmware_update_necessary),
        nw_data: (mode == BootMode::UpdateDownloader).then(|| nw_data).flatten(),
    }
}

/// A RAM window the next layer reads out of. `zero` must scrub the whole
/// window; `write` programs `bytes` starting at offset 0.
pub trait HandoffWindow {
    fn zero(&mut self);
    fn write(&mut self, bytes: &[u8]);
}

impl NextLayerBootParams {
    /// Serializes this value and commits it to `window`, zeroizing the
    /// window first. Consumes `self` so a caller cannot accidentally reuse
    /// (and re-commit) a value after handoff.
    pub fn commit(self, window: &mut impl HandoffWindow) -> Result<(), HandoffError> {
        let mut buf = [0u8; NextLayerBootParams::MAX_SIZE];
        let len =
            hubpack::serialize(&mut buf, &self).map_err(|_| HandoffError::EncodeFailed)?;
        window.zero();
        window.write(&buf[..len]);
        Ok(())
    }
}

/// The assembled per-boot certificate store: hub cert (if any), DeviceID
/// cert, and a freshly issued AliasID cert, concatenated with null
/// terminators and indexed by a small table.
///
/// This same fixed layout also backs the persisted trust-anchors cert bag
/// in the data store (which only ever populates the `Hub`/`DeviceId`
/// slots); both are just a cursor, a table, and a byte bag, so one type
/// serves both the volatile and the persisted case.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ImageCertStore {
    cursor: u32,
    table: [(u32, u32); CERT_TABLE_SLOTS],
    bag: [u8; CERT_BAG_LEN],
}

impl ImageCertStore {
    pub fn empty() -> Self {
        ImageCertStore {
            cursor: 0,
            table: [(0, 0); CERT_TABLE_SLOTS],
            bag: [0u8; CERT_BAG_LEN],
        }
    }

    /// Appends `cert` (DER, PEM, whatever the caller already encoded) into
    /// slot `slot`, null-terminating it in the bag. The table entry records
    /// `(start, size)` without the terminator.
    pub fn push(&mut self, slot: CertSlot, cert: &[u8]) -> Result<(), HandoffError> {
        let start = self.cursor as usize;
        let end = start
            .checked_add(cert.len())
            .and_then(|e| e.checked_add(1))
            .ok_or(HandoffError::CertBagFull)?;
        if end > self.bag.len() {
            return Err(HandoffError::CertBagFull);
        }
        self.bag[start..start + cert.len()].copy_from_slice(cert);
        self.bag[start + cert.len()] = 0;
        self.table[slot as usize] = (start as u32, cert.len() as u32);
        self.cursor = end as u32;
        Ok(())
    }

    pub fn get(&self, slot: CertSlot) -> Option<&[u8]> {
        let (start, size) = self.table[slot as usize];
        if size == 0 {
            return None;
        }
        let start = start as usize;
        let size = size as usize;
        Some(&self.bag[start..start + size])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_bad_magic() {
        let mut raw = RawBootParams {
            magic: 0xDEAD_BEEF,
            _pad0: 0,
            cdi_prime: [1; 32],
            dev_uuid: [0; 16],
            core_auth: [2; 32],
            cur_nonce: 1,
            next_nonce: 2,
            static_symm: [0; 32],
            initial_boot: 0,
        };
        raw.magic = 0xDEAD_BEEF;
        let bytes = raw.as_bytes();
        assert_eq!(BootParams::parse(bytes).unwrap_err(), HandoffError::BadMagic);
    }

    #[test]
    fn parse_treats_all_zero_static_symm_as_absent() {
        let raw = RawBootParams {
            magic: LZ_MAGIC,
            _pad0: 0,
            cdi_prime: [1; 32],
            dev_uuid: [0; 16],
            core_auth: [2; 32],
            cur_nonce: 1,
            next_nonce: 2,
            static_symm: [0; 32],
            initial_boot: 0,
        };
        let params = BootParams::parse(raw.as_bytes()).unwrap();
        assert!(params.static_symm.is_none());
    }

    #[test]
    fn provision_hides_secrets_from_app() {
        let params = provision(
            BootMode::App,
            "priv-pem",
            "pub-pem",
            [0; 16],
            10,
            20,
            [7; 32],
            false,
            false,
            None,
        );
        assert!(params.cur_nonce.is_none());
        assert!(params.dev_auth.is_none());
        assert!(params.nw_data.is_none());
        assert_eq!(params.next_nonce, Some(10));
    }

    #[test]
    fn provision_gives_recovery_layers_dev_auth() {
        let params = provision(
            BootMode::UpdateDownloader,
            "priv-pem",
            "pub-pem",
            [0; 16],
            10,
            20,
            [7; 32],
            true,
            true,
            Some([9; 64]),
        );
        assert_eq!(params.cur_nonce, Some(20));
        assert_eq!(params.dev_auth, Some([7; 32]));
        assert_eq!(params.nw_data, Some([9; 64]));
    }

    #[test]
    fn cert_store_round_trips_entries() {
        let mut store = ImageCertStore::empty();
        store.push(CertSlot::DeviceId, b"device-id-cert").unwrap();
        store.push(CertSlot::AliasId, b"alias-id-cert").unwrap();
        assert_eq!(store.get(CertSlot::DeviceId), Some(&b"device-id-cert"[..]));
        assert_eq!(store.get(CertSlot::AliasId), Some(&b"alias-id-cert"[..]));
        assert_eq!(store.get(CertSlot::Hub), None);
    }
}
