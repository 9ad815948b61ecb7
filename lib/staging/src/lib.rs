// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The staging-area scanner and its per-element verifier.
//!
//! The staging area is an append-only sequence of (header, payload) records
//! written by the management service. A scan is a linear walk that stops at
//! the first header whose magic doesn't match; every header it does yield
//! is structurally present, but may still be stale, corrupt, or forged, so
//! [`verify_element`] is a separate step callers must not skip.
//!
//! Only the verifying lookup ([`find_valid`]) is public. A lookup that only
//! checks an element's presence without verifying its signature and
//! freshness is deliberately not exposed here.

#![cfg_attr(not(test), no_std)]

use lz_config::LZ_MAGIC;
use lz_crypto::{sha256, Digest, PublicKey, Signature};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ElementType {
    BootTicket = 0,
    DeferralTicket = 1,
    CoreUpdate = 2,
    UdownloaderUpdate = 3,
    CpatcherUpdate = 4,
    AppUpdate = 5,
    ConfigUpdate = 6,
    DeviceIdReassocRes = 7,
}

impl ElementType {
    fn from_u8(v: u8) -> Option<Self> {
        use ElementType::*;
        Some(match v {
            0 => BootTicket,
            1 => DeferralTicket,
            2 => CoreUpdate,
            3 => UdownloaderUpdate,
            4 => CpatcherUpdate,
            5 => AppUpdate,
            6 => ConfigUpdate,
            7 => DeviceIdReassocRes,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingError {
    /// The staging area held no element of the requested type.
    NotFound,
    /// The payload length recorded in the header is zero or overruns the
    /// staging area.
    InvalidLength,
    /// `sha256(payload) != header.digest`.
    BadDigest,
    /// `header.nonce != cur_nonce`: this element does not belong to the
    /// current boot epoch and may be a replay of an older ticket.
    StaleNonce,
    /// The management signature over the header content did not verify.
    BadSignature,
}

/// The signed portion of a staging header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct StagingHeaderContent {
    pub magic: u32,
    pub elem_type: u8,
    pub _reserved: [u8; 3],
    pub payload_size: u32,
    pub digest: Digest,
    pub nonce: u32,
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct StagingHeader {
    pub content: StagingHeaderContent,
    pub signature: [u8; 64],
}

impl StagingHeader {
    pub fn elem_type(&self) -> Option<ElementType> {
        ElementType::from_u8(self.content.elem_type)
    }

    pub fn signature(&self) -> Signature {
        Signature::from_bytes(&self.signature)
    }
}

/// One structurally-present (but not yet verified) staging record.
pub struct StagedElement<'a> {
    pub header: &'a StagingHeader,
    pub payload: &'a [u8],
}

/// Walks the staging area from offset 0 while the current header's magic
/// matches, yielding each structurally valid record. Stops (without error)
/// at the first mismatched magic, erased space, or truncated record.
pub struct StagingScanner<'a> {
    bytes: &'a [u8],
    offset: usize,
    stopped: bool,
}

impl<'a> StagingScanner<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        StagingScanner {
            bytes,
            offset: 0,
            stopped: false,
        }
    }
}

impl<'a> Iterator for StagingScanner<'a> {
    type Item = StagedElement<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stopped {
            return None;
        }
        let remaining = &self.bytes[self.offset..];
        let Ok((header, after_header)) = StagingHeader::ref_from_prefix(remaining) else {
            self.stopped = true;
            return None;
        };
        if header.content.magic != LZ_MAGIC {
            self.stopped = true;
            return None;
        }
        let payload_size = header.content.payload_size as usize;
        if payload_size == 0 || payload_size > after_header.len() {
            self.stopped = true;
            return None;
        }
        let payload = &after_header[..payload_size];
        self.offset += core::mem::size_of::<StagingHeader>() + payload_size;
        Some(StagedElement { header, payload })
    }
}

/// Verifies one staged element's digest, freshness, and signature, in that
/// order; all three must pass.
pub fn verify_element(
    elem: &StagedElement<'_>,
    management_key: &PublicKey,
    cur_nonce: u32,
) -> Result<(), StagingError> {
    let digest: Digest = sha256(elem.payload);
    if digest != elem.header.content.digest {
        return Err(StagingError::BadDigest);
    }
    if elem.header.content.nonce != cur_nonce {
        return Err(StagingError::StaleNonce);
    }
    management_key
        .verify(elem.header.content.as_bytes(), &elem.header.signature())
        .map_err(|_| StagingError::BadSignature)
}

/// The only staging lookup this crate exposes: scans for the first element
/// of `wanted` whose header verifies under `management_key` at `cur_nonce`.
/// An element that is present but fails verification is skipped, not
/// returned as a false match.
pub fn find_valid<'a>(
    staging: &'a [u8],
    wanted: ElementType,
    management_key: &PublicKey,
    cur_nonce: u32,
) -> Result<StagedElement<'a>, StagingError> {
    for elem in StagingScanner::new(staging) {
        if elem.header.elem_type() != Some(wanted) {
            continue;
        }
        if verify_element(&elem, management_key, cur_nonce).is_ok() {
            return Ok(elem);
        }
    }
    Err(StagingError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lz_crypto::{sha256, Keypair};
    use rand_core::OsRng;

    fn build_element(elem_type: ElementType, payload: &[u8], nonce: u32, signer: &Keypair) -> Vec<u8> {
        let mut rng = OsRng;
        let content = StagingHeaderContent {
            magic: LZ_MAGIC,
            elem_type: elem_type as u8,
            _reserved: [0; 3],
            payload_size: payload.len() as u32,
            digest: sha256(payload),
            nonce,
        };
        let sig = signer.sign(content.as_bytes(), &mut rng);
        let header = StagingHeader {
            content,
            signature: *sig.as_bytes(),
        };
        let mut bytes = header.as_bytes().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn scan_stops_at_erased_space() {
        let signer = Keypair::derive(&sha256(b"management key")).unwrap();
        let mut area = build_element(ElementType::BootTicket, b"ticket-one", 7, &signer);
        area.extend(build_element(ElementType::AppUpdate, b"app-bytes", 7, &signer));
        area.resize(4096, 0xFF);

        let elements: Vec<_> = StagingScanner::new(&area).collect();
        assert_eq!(elements.len(), 2);
    }

    #[test]
    fn find_valid_skips_stale_nonce_and_keeps_scanning() {
        let signer = Keypair::derive(&sha256(b"management key")).unwrap();
        let mut area = build_element(ElementType::AppUpdate, b"stale payload", 1, &signer);
        area.extend(build_element(ElementType::AppUpdate, b"fresh payload", 7, &signer));
        area.resize(4096, 0xFF);

        let found = find_valid(&area, ElementType::AppUpdate, &signer.public_key(), 7).unwrap();
        assert_eq!(found.payload, b"fresh payload");
    }

    #[test]
    fn find_valid_rejects_forged_signature() {
        let signer = Keypair::derive(&sha256(b"management key")).unwrap();
        let attacker = Keypair::derive(&sha256(b"attacker key")).unwrap();
        let mut area = build_element(ElementType::AppUpdate, b"forged", 7, &attacker);
        area.resize(4096, 0xFF);

        let result = find_valid(&area, ElementType::AppUpdate, &signer.public_key(), 7);
        assert!(matches!(result, Err(StagingError::NotFound)));
    }
}
