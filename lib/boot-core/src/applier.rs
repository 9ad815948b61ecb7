// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The update applier: walks a staging area whose headers are individually
//! authenticated, installs the updates it recognizes, and refreshes
//! anti-rollback metadata for anything that lands in an image region.
//!
//! Tickets (`BOOT_TICKET`, `DEFERRAL_TICKET`) are deliberately not handled
//! here — they are read directly by the boot mode selector and the
//! watchdog arming step, never "applied".

use lz_config::LZ_MAGIC;
use lz_crypto::PublicKey;
use lz_datastore::{DataStore, ImgSlot};
use lz_flash::{FlashRegion, Region};
use lz_image::{verify_image, ImageHeader};
use lz_staging::{verify_element, ElementType, StagingScanner};
use zerocopy::FromBytes;

use crate::Error;

/// A device-reassociation response: the new `dev_uuid` the management
/// service has bound this device to.
#[derive(Debug, Clone, Copy, FromBytes, zerocopy::IntoBytes, zerocopy::KnownLayout, zerocopy::Immutable)]
#[repr(C)]
pub struct DeviceIdReassocPayload {
    pub magic: u32,
    pub dev_uuid: [u8; 16],
}

/// What a completed apply pass found, beyond the installs it already made.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// A verified `LZ_CORE_UPDATE` is waiting for the core-patcher; the
    /// selector must force boot mode to CPATCHER regardless of any
    /// `BOOT_TICKET` present.
    pub core_update_pending: bool,
}

fn region_and_slot(elem: ElementType) -> Option<(Region, ImgSlot)> {
    match elem {
        ElementType::CpatcherUpdate => Some((Region::CorePatcherImage, ImgSlot::CorePatcher)),
        ElementType::UdownloaderUpdate => {
            Some((Region::UpdateDownloaderImage, ImgSlot::UpdateDownloader))
        }
        ElementType::AppUpdate => Some((Region::AppImage, ImgSlot::App)),
        _ => None,
    }
}

/// Installs every verified, recognized staging element into its target
/// region, refreshing image metadata as it goes. A failure applying any
/// one update aborts the whole pass (§7: "a half-applied update cannot be
/// tolerated").
pub fn apply_updates(
    flash: &mut impl FlashRegion,
    staging: &[u8],
    management_key: &PublicKey,
    code_authority_key: &PublicKey,
    cur_nonce: u32,
    data_store: &mut DataStore,
) -> Result<ApplyOutcome, Error> {
    let mut outcome = ApplyOutcome::default();

    for elem in StagingScanner::new(staging) {
        let Some(elem_type) = elem.header.elem_type() else {
            continue;
        };
        if verify_element(&elem, management_key, cur_nonce).is_err() {
            lz_trace::trace!(lz_trace::TraceEvent::StagingElementSkipped(elem_type as u8));
            continue;
        }

        match elem_type {
            ElementType::BootTicket | ElementType::DeferralTicket => continue,
            ElementType::CoreUpdate => {
                outcome.core_update_pending = true;
            }
            ElementType::ConfigUpdate => {
                let nw_info = lz_datastore::NwInfo::read_from_bytes(elem.payload)
                    .map_err(|_| Error::Corrupted)?;
                data_store.config.nw_info = nw_info;
            }
            ElementType::DeviceIdReassocRes => {
                let reassoc = DeviceIdReassocPayload::read_from_bytes(elem.payload)
                    .map_err(|_| Error::Corrupted)?;
                if reassoc.magic != LZ_MAGIC {
                    return Err(Error::Corrupted);
                }
                data_store.config.static_symm_info.dev_uuid = reassoc.dev_uuid;
            }
            ElementType::CpatcherUpdate
            | ElementType::UdownloaderUpdate
            | ElementType::AppUpdate => {
                let (region, slot) = region_and_slot(elem_type).expect("mapped above");
                install_image(flash, region, elem.payload, code_authority_key, data_store, slot)?;
            }
        }

        lz_trace::trace!(lz_trace::TraceEvent::StagingElementApplied(elem_type as u8));
    }

    Ok(outcome)
}

fn install_image(
    flash: &mut impl FlashRegion,
    region: Region,
    payload: &[u8],
    code_authority_key: &PublicKey,
    data_store: &mut DataStore,
    slot: ImgSlot,
) -> Result<(), Error> {
    let header = ImageHeader::parse(payload)?;
    let metadata = data_store.config.metadata(slot);
    verify_image(header, payload, code_authority_key, metadata)?;

    flash.write(region, 0, payload)?;
    data_store.config.metadata_mut(slot).advance(header);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lz_config::LZ_MAGIC;
    use lz_crypto::{sha256, Keypair};
    use lz_datastore::DataStore;
    use lz_flash::mock::InMemoryFlash;
    use lz_image::{ImageHeader, ImageHeaderContent};
    use lz_staging::{ElementType, StagingHeader, StagingHeaderContent};
    use rand_core::OsRng;
    use zerocopy::IntoBytes;

    fn build_image(code: &[u8], version: u32, issue_time: u32, signer: &Keypair) -> Vec<u8> {
        let mut rng = OsRng;
        let hdr_size = core::mem::size_of::<ImageHeader>();
        let content = ImageHeaderContent {
            magic: LZ_MAGIC,
            hdr_size: hdr_size as u32,
            size: code.len() as u32,
            name: [0u8; lz_image::NAME_LEN],
            version,
            issue_time,
            digest: sha256(code),
        };
        let sig = signer.sign(content.as_bytes(), &mut rng);
        let header = ImageHeader {
            content,
            signature: *sig.as_bytes(),
        };
        let mut bytes = header.as_bytes().to_vec();
        bytes.extend_from_slice(code);
        bytes
    }

    fn build_staging_element(
        elem_type: ElementType,
        payload: &[u8],
        nonce: u32,
        signer: &Keypair,
    ) -> Vec<u8> {
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
    fn app_update_installs_and_advances_metadata() {
        let management = Keypair::derive(&sha256(b"management")).unwrap();
        let code_authority = Keypair::derive(&sha256(b"code authority")).unwrap();
        let image = build_image(b"new app code", 2, 200, &code_authority);

        let mut staging = build_staging_element(ElementType::AppUpdate, &image, 7, &management);
        staging.resize(4096, 0xFF);

        let mut flash = InMemoryFlash::new(4096, 4096, 256);
        let mut store = DataStore::erased();

        let outcome = apply_updates(
            &mut flash,
            &staging,
            &management.public_key(),
            &code_authority.public_key(),
            7,
            &mut store,
        )
        .unwrap();

        assert!(!outcome.core_update_pending);
        assert_eq!(store.config.metadata(ImgSlot::App).last_version, 2);

        let mut installed = vec![0u8; image.len()];
        flash
            .read(Region::AppImage, 0, &mut installed)
            .unwrap();
        assert_eq!(installed, image);
    }

    #[test]
    fn core_update_is_flagged_but_not_written_to_flash() {
        let management = Keypair::derive(&sha256(b"management")).unwrap();
        let code_authority = Keypair::derive(&sha256(b"code authority")).unwrap();

        let mut staging =
            build_staging_element(ElementType::CoreUpdate, b"core update marker", 3, &management);
        staging.resize(4096, 0xFF);

        let mut flash = InMemoryFlash::new(4096, 4096, 256);
        let mut store = DataStore::erased();

        let outcome = apply_updates(
            &mut flash,
            &staging,
            &management.public_key(),
            &code_authority.public_key(),
            3,
            &mut store,
        )
        .unwrap();

        assert!(outcome.core_update_pending);
    }

    #[test]
    fn rolled_back_update_fails_the_whole_apply_pass() {
        let management = Keypair::derive(&sha256(b"management")).unwrap();
        let code_authority = Keypair::derive(&sha256(b"code authority")).unwrap();
        let image = build_image(b"old app code", 1, 50, &code_authority);

        let mut staging = build_staging_element(ElementType::AppUpdate, &image, 9, &management);
        staging.resize(4096, 0xFF);

        let mut flash = InMemoryFlash::new(4096, 4096, 256);
        let mut store = DataStore::erased();
        store.config.metadata_mut(ImgSlot::App).advance(
            ImageHeader::parse(&build_image(b"newer", 5, 500, &code_authority)).unwrap(),
        );

        let result = apply_updates(
            &mut flash,
            &staging,
            &management.public_key(),
            &code_authority.public_key(),
            9,
            &mut store,
        );
        assert_eq!(result, Err(Error::Rollback));
    }
}
