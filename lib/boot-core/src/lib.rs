// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The trusted-boot decision engine.
//!
//! This crate owns the one state machine that matters: given the boot
//! parameters handed down by the pre-boot stage, it derives DeviceID,
//! verifies and applies any pending update, picks a boot mode, derives
//! AliasID, and provisions the next layer's RAM window. Everything below it
//! (flash, crypto, image/staging parsing, the data store) is a leaf crate
//! with no opinion about boot policy; this crate is the only place that
//! opinion lives.
//!
//! [`selector::run`] is the only entry point a platform binary calls.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod applier;
mod error;
mod identity;
mod selector;
mod watchdog;

pub use applier::{apply_updates, ApplyOutcome, DeviceIdReassocPayload};
pub use error::Error;
pub use identity::{derive_alias_id, derive_device_id, derive_dev_auth};
pub use lz_handoff::BootMode;
pub use selector::{run, Outcome};
pub use watchdog::Watchdog;

#[cfg(any(test, feature = "std"))]
pub use watchdog::mock;
