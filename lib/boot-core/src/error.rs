// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::fmt;
use lz_datastore::DataStoreError;
use lz_flash::FlashError;
use lz_handoff::HandoffError;
use lz_image::ImageError;
use lz_staging::StagingError;

/// Every failure mode the boot decision engine can produce, per §7 of the
/// design. The variant alone decides fatal/recoverable/blocking handling in
/// [`crate::selector::run`]; callers never need to inspect a sub-reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Malformed input boot parameters or a header that should have parsed.
    InvalidInput,
    /// Trust anchors or a required image header lacks the expected magic.
    NotProvisioned,
    /// A magic mismatch was found mid-scan of a structure expected valid.
    Corrupted,
    /// ECDSA verification failed.
    BadSignature,
    /// A SHA-256 digest did not match.
    BadDigest,
    /// A staging element's nonce did not match the current boot epoch.
    StaleNonce,
    /// An image's version or issue time regressed against persisted metadata.
    Rollback,
    /// A flash write did not acknowledge.
    FlashError,
    /// A requested staging element type was absent.
    NotFound,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Error::InvalidInput => "invalid input",
            Error::NotProvisioned => "not provisioned",
            Error::Corrupted => "corrupted",
            Error::BadSignature => "bad signature",
            Error::BadDigest => "bad digest",
            Error::StaleNonce => "stale nonce",
            Error::Rollback => "rollback",
            Error::FlashError => "flash error",
            Error::NotFound => "not found",
        };
        f.write_str(s)
    }
}

impl From<FlashError> for Error {
    fn from(_: FlashError) -> Self {
        Error::FlashError
    }
}

impl From<DataStoreError> for Error {
    fn from(e: DataStoreError) -> Self {
        match e {
            DataStoreError::Flash(_) => Error::FlashError,
            DataStoreError::Truncated => Error::Corrupted,
            DataStoreError::NoKey | DataStoreError::BadKey => Error::NotProvisioned,
        }
    }
}

impl From<HandoffError> for Error {
    fn from(e: HandoffError) -> Self {
        match e {
            HandoffError::BadMagic => Error::InvalidInput,
            HandoffError::Truncated => Error::InvalidInput,
            HandoffError::CertBagFull => Error::Corrupted,
            HandoffError::EncodeFailed => Error::Corrupted,
        }
    }
}

impl From<ImageError> for Error {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::BadMagic => Error::NotProvisioned,
            ImageError::InvalidLength => Error::Corrupted,
            ImageError::BadDigest => Error::BadDigest,
            ImageError::BadSignature => Error::BadSignature,
            ImageError::Rollback => Error::Rollback,
            ImageError::MetadataInvalid => Error::NotProvisioned,
        }
    }
}

impl From<StagingError> for Error {
    fn from(e: StagingError) -> Self {
        match e {
            StagingError::NotFound => Error::NotFound,
            StagingError::InvalidLength => Error::Corrupted,
            StagingError::BadDigest => Error::BadDigest,
            StagingError::StaleNonce => Error::StaleNonce,
            StagingError::BadSignature => Error::BadSignature,
        }
    }
}

impl From<lz_crypto::CryptoError> for Error {
    fn from(_: lz_crypto::CryptoError) -> Self {
        Error::InvalidInput
    }
}

impl From<lz_cert::CertError> for Error {
    fn from(_: lz_cert::CertError) -> Self {
        Error::Corrupted
    }
}
