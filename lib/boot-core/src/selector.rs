// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The top-level boot mode selector: the state machine in §4.7, wired up
//! against the leaf crates that do the actual parsing, verifying, and
//! signing. Everything else in this crate exists to be called from here.

use lz_cert::{serial_from_pubkey, CertBuilder, CsrBuilder};
use lz_config::{CertSlot, DEFAULT_WDT_TIMEOUT_S, LZ_MAGIC, LZ_STAGING_AREA_SIZE};
use lz_crypto::Keypair;
use lz_datastore::{DataStore, ImgSlot};
use lz_flash::{FlashRegion, Region};
use lz_handoff::{self, BootMode, BootParams, HandoffWindow, ImageCertStore};
use lz_image::{verify_image, ImageHeader};
use lz_staging::{find_valid, ElementType};
use rand_core::CryptoRngCore;
use zerocopy::IntoBytes;
use zeroize::Zeroize;

use crate::applier::apply_updates;
use crate::identity::{derive_alias_id, derive_device_id, derive_dev_auth};
use crate::watchdog::Watchdog;
use crate::Error;

/// What a completed (non-panicking) boot attempt produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The device should transfer control to the next layer in `BootMode`.
    Booted(BootMode),
    /// The device is not yet provisioned; the caller should spin forever.
    Blocked,
    /// An unrecoverable condition was hit; the caller should halt.
    Fatal(Error),
}

/// Runs one full boot decision. `raw_boot_params` is zeroized before this
/// returns, on every path, successful or not (§8 property 7).
#[allow(clippy::too_many_arguments)]
pub fn run(
    raw_boot_params: &mut [u8],
    flash: &mut impl FlashRegion,
    watchdog: &mut impl Watchdog,
    next_layer_window: &mut impl HandoffWindow,
    cert_store_window: &mut impl HandoffWindow,
    rng: &mut impl CryptoRngCore,
    core_image_header: &[u8],
) -> Outcome {
    let result = run_inner(
        raw_boot_params,
        flash,
        watchdog,
        next_layer_window,
        cert_store_window,
        rng,
        core_image_header,
    );
    raw_boot_params.zeroize();
    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            lz_trace::trace!(lz_trace::TraceEvent::Fatal(fatal_tag(e)));
            Outcome::Fatal(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_inner(
    raw_boot_params: &[u8],
    flash: &mut impl FlashRegion,
    watchdog: &mut impl Watchdog,
    next_layer_window: &mut impl HandoffWindow,
    cert_store_window: &mut impl HandoffWindow,
    rng: &mut impl CryptoRngCore,
    core_image_header: &[u8],
) -> Result<Outcome, Error> {
    let params = BootParams::parse(raw_boot_params).map_err(|_| {
        lz_trace::trace!(lz_trace::TraceEvent::BootParamsInvalid);
        Error::InvalidInput
    })?;
    let device_id = derive_device_id(&params.cdi_prime)?;

    let mut store = DataStore::load(flash)?;
    let identity_changed;

    if params.initial_boot {
        lz_trace::trace!(lz_trace::TraceEvent::InitialBoot);
        DataStore::erase(flash)?;
        flash.erase_region(Region::Staging)?;
        store = DataStore::erased();
        let static_symm = params.static_symm.as_ref().ok_or(Error::InvalidInput)?;
        store.config.static_symm_info.magic = LZ_MAGIC;
        store.config.static_symm_info.static_symm = **static_symm;
        store.config.static_symm_info.dev_uuid = params.dev_uuid;
        identity_changed = true;
    } else {
        lz_trace::trace!(lz_trace::TraceEvent::NormalBoot);
        if store.config.static_symm_info.static_symm != [0u8; 32] {
            store.config.static_symm_info.wipe_secret();
        }
        identity_changed = match store.trust_anchors.deviceid_pub.public_key() {
            Ok(Some(stored)) => stored.to_sec1_bytes() != device_id.public_key().to_sec1_bytes(),
            Ok(None) | Err(_) => true,
        };
    }

    if identity_changed {
        lz_trace::trace!(lz_trace::TraceEvent::IdentityChanged);
        issue_device_id_csr(&mut store, &device_id, rng)?;
    } else {
        lz_trace::trace!(lz_trace::TraceEvent::IdentityUnchanged);
    }
    store.trust_anchors.magic = LZ_MAGIC;
    store.save(flash)?;

    if !provisioning_complete(flash, &store, core_image_header) {
        lz_trace::trace!(lz_trace::TraceEvent::NotProvisioned);
        return Ok(Outcome::Blocked);
    }

    let management_key = store
        .trust_anchors
        .management_pub
        .public_key()?
        .ok_or(Error::NotProvisioned)?;
    let code_authority_key = store
        .trust_anchors
        .code_authority_pub
        .public_key()?
        .ok_or(Error::NotProvisioned)?;

    let mut staging_buf = [0u8; LZ_STAGING_AREA_SIZE];
    let staging_len = flash.region_len(Region::Staging).min(staging_buf.len());
    flash.read(Region::Staging, 0, &mut staging_buf[..staging_len])?;
    let staging = &staging_buf[..staging_len];

    let apply_outcome = apply_updates(
        flash,
        staging,
        &management_key,
        &code_authority_key,
        params.cur_nonce,
        &mut store,
    )?;
    store.save(flash)?;

    let boot_ticket_valid =
        find_valid(staging, ElementType::BootTicket, &management_key, params.cur_nonce).is_ok();

    let mut mode = if apply_outcome.core_update_pending {
        BootMode::CorePatcher
    } else if boot_ticket_valid {
        BootMode::App
    } else {
        BootMode::UpdateDownloader
    };
    lz_trace::trace!(lz_trace::TraceEvent::ModeSelected(mode_tag(mode)));

    let mut firmware_update_necessary = false;
    let image_digest = loop {
        let (region, slot) = mode_region(mode);
        let image_bytes = flash.as_slice(region);
        let verified = ImageHeader::parse(image_bytes)
            .map_err(Error::from)
            .and_then(|header| {
                verify_image(header, image_bytes, &code_authority_key, store.config.metadata(slot))
                    .map(|()| header.content.digest)
                    .map_err(Error::from)
            });
        match verified {
            Ok(digest) => break digest,
            Err(e) => {
                lz_trace::trace!(lz_trace::TraceEvent::ImageVerifyFailed(mode_tag(mode)));
                if mode == BootMode::App {
                    lz_trace::trace!(lz_trace::TraceEvent::AppRecovered);
                    firmware_update_necessary = true;
                    mode = BootMode::UpdateDownloader;
                    continue;
                }
                return Err(e);
            }
        }
    };

    let mut priv_pem_buf = [0u8; 256];
    let deviceid_priv_pem = device_id.private_to_pem(&mut priv_pem_buf)?;
    let alias_id = derive_alias_id(&image_digest, deviceid_priv_pem)?;

    let mut deviceid_pub_buf = [0u8; 256];
    let deviceid_pub_pem = device_id.public_key().to_pem(&mut deviceid_pub_buf)?;
    let dev_auth = derive_dev_auth(&params.core_auth, deviceid_pub_pem, &params.dev_uuid);

    let mut certs = ImageCertStore::empty();
    if let Some(hub) = store.trust_anchors.hub_cert() {
        certs.push(CertSlot::Hub, hub)?;
    }
    if let Some(deviceid_cert) = store.trust_anchors.deviceid_cert() {
        certs.push(CertSlot::DeviceId, deviceid_cert)?;
    }
    let alias_serial = serial_from_pubkey(&alias_id.public_key().to_sec1_bytes());
    let mut alias_cert_der_buf = [0u8; lz_cert::MAX_CERT_LEN];
    let alias_cert_der = CertBuilder::new(
        alias_serial,
        "CN=DeviceID, O=Lazarus, C=DE",
        "CN=AliasID, O=Lazarus, C=DE",
        &alias_id.public_key(),
    )
    .set_fwid(image_digest)
    .sign(&device_id, rng, &mut alias_cert_der_buf)?;
    let mut alias_cert_pem_buf = [0u8; lz_cert::MAX_CERT_LEN + 64];
    let alias_cert_pem = pem_wrap("CERTIFICATE", alias_cert_der, &mut alias_cert_pem_buf)?;
    certs.push(CertSlot::AliasId, alias_cert_pem.as_bytes())?;

    cert_store_window.zero();
    cert_store_window.write(certs.as_bytes());

    let mut alias_priv_buf = [0u8; 256];
    let alias_priv_pem = alias_id.private_to_pem(&mut alias_priv_buf)?;
    let mut alias_pub_buf = [0u8; 256];
    let alias_pub_pem = alias_id.public_key().to_pem(&mut alias_pub_buf)?;

    let nw_data = store.config.nw_info.is_present().then_some(store.config.nw_info.psk);

    let next_params = lz_handoff::provision(
        mode,
        alias_priv_pem,
        alias_pub_pem,
        params.dev_uuid,
        params.next_nonce,
        params.cur_nonce,
        dev_auth,
        identity_changed,
        firmware_update_necessary,
        nw_data,
    );
    next_params.commit(next_layer_window)?;

    let deferral = find_valid(staging, ElementType::DeferralTicket, &management_key, params.cur_nonce)
        .ok()
        .and_then(|elem| elem.payload.get(0..4))
        .and_then(|bytes| bytes.try_into().ok())
        .map(u32::from_le_bytes)
        .unwrap_or(DEFAULT_WDT_TIMEOUT_S);
    watchdog.arm(deferral);
    lz_trace::trace!(lz_trace::TraceEvent::WatchdogArmed(deferral));

    Ok(Outcome::Booted(mode))
}

/// Re-derives the DeviceID CSR and records the new public key, run whenever
/// the freshly derived DeviceID doesn't match what's on flash — including
/// the very first boot, where there is nothing to compare against yet.
fn issue_device_id_csr(
    store: &mut DataStore,
    device_id: &Keypair,
    rng: &mut impl CryptoRngCore,
) -> Result<(), Error> {
    let mut pub_pem_buf = [0u8; 256];
    let pub_pem = device_id.public_key().to_pem(&mut pub_pem_buf)?;
    store.trust_anchors.deviceid_pub.set(pub_pem)?;

    let mut csr_der_buf = [0u8; lz_cert::MAX_CERT_LEN];
    let csr_der = CsrBuilder::new("CN=DeviceID, O=Lazarus, C=DE", device_id)
        .sign(device_id, rng, &mut csr_der_buf)?;
    let mut csr_pem_buf = [0u8; lz_cert::MAX_CERT_LEN + 64];
    let csr_pem = pem_wrap("CERTIFICATE REQUEST", csr_der, &mut csr_pem_buf)?;
    store.trust_anchors.cert_bag.push(CertSlot::DeviceId, csr_pem.as_bytes())?;
    Ok(())
}

fn pem_wrap<'a>(label: &str, der: &[u8], out: &'a mut [u8]) -> Result<&'a str, Error> {
    pem_rfc7468::encode(label, pem_rfc7468::LineEnding::LF, der, out).map_err(|_| Error::Corrupted)
}

/// Provisioning is complete once every layer's header carries the expected
/// magic and the trust anchors themselves are valid. The core's own header
/// lives outside the regions this engine can write, so it's handed in by
/// the caller rather than read through `flash`.
fn provisioning_complete(flash: &impl FlashRegion, store: &DataStore, core_image_header: &[u8]) -> bool {
    store.trust_anchors.is_valid()
        && ImageHeader::parse(core_image_header).is_ok()
        && ImageHeader::parse(flash.as_slice(Region::CorePatcherImage)).is_ok()
        && ImageHeader::parse(flash.as_slice(Region::UpdateDownloaderImage)).is_ok()
        && ImageHeader::parse(flash.as_slice(Region::AppImage)).is_ok()
}

fn mode_region(mode: BootMode) -> (Region, ImgSlot) {
    match mode {
        BootMode::App => (Region::AppImage, ImgSlot::App),
        BootMode::UpdateDownloader => (Region::UpdateDownloaderImage, ImgSlot::UpdateDownloader),
        BootMode::CorePatcher => (Region::CorePatcherImage, ImgSlot::CorePatcher),
    }
}

fn mode_tag(mode: BootMode) -> u8 {
    match mode {
        BootMode::App => 0,
        BootMode::UpdateDownloader => 1,
        BootMode::CorePatcher => 2,
    }
}

fn fatal_tag(e: Error) -> u8 {
    e as u8
}
