// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Image headers and the image verifier.
//!
//! Every layer's flash region begins with an [`ImageHeader`]: a fixed-layout,
//! checked-in-place record followed by the code segment it describes. As in
//! the rest of this codebase, parsing never trusts a length field before
//! bounds-checking it against the buffer actually in hand; the first invalid
//! field stops the parse, and everything checked before it stays valid.

#![cfg_attr(not(test), no_std)]

use lz_config::LZ_MAGIC;
use lz_crypto::{sha256, Digest, PublicKey, Signature};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const NAME_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    /// A required header is missing or its magic does not match.
    BadMagic,
    /// `hdr_size`, `size`, or the buffer length make the image layout
    /// impossible (e.g. the code segment would run past the buffer).
    InvalidLength,
    /// The code segment's digest does not match `content.digest`.
    BadDigest,
    /// The header signature did not verify under the code-authority key.
    BadSignature,
    /// The candidate image's version or issue time did not advance past
    /// the persisted metadata (anti-rollback).
    Rollback,
    /// The persisted metadata record's magic does not match.
    MetadataInvalid,
}

/// The signed portion of an image header: everything the code-authority
/// signature covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ImageHeaderContent {
    pub magic: u32,
    pub hdr_size: u32,
    pub size: u32,
    pub name: [u8; NAME_LEN],
    pub version: u32,
    pub issue_time: u32,
    pub digest: Digest,
}

/// An [`ImageHeaderContent`] plus the signature over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ImageHeader {
    pub content: ImageHeaderContent,
    pub signature: [u8; 64],
}

impl ImageHeader {
    /// Parses a header in place out of `bytes`, checking bounds before
    /// trusting any length field taken from the header itself.
    pub fn parse(bytes: &[u8]) -> Result<&ImageHeader, ImageError> {
        let header = ImageHeader::ref_from_prefix(bytes)
            .map(|(header, _rest)| header)
            .map_err(|_| ImageError::InvalidLength)?;

        if header.content.magic != LZ_MAGIC {
            return Err(ImageError::BadMagic);
        }

        let hdr_size = header.content.hdr_size as usize;
        let size = header.content.size as usize;
        let total = hdr_size
            .checked_add(size)
            .ok_or(ImageError::InvalidLength)?;
        if hdr_size < core::mem::size_of::<ImageHeader>() || total > bytes.len() {
            return Err(ImageError::InvalidLength);
        }

        Ok(header)
    }

    /// The code segment this header describes, given the full image buffer
    /// `bytes` this header was parsed from.
    pub fn code_slice<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        let start = self.content.hdr_size as usize;
        let end = start + self.content.size as usize;
        &bytes[start..end]
    }

    pub fn signature(&self) -> Signature {
        Signature::from_bytes(&self.signature)
    }
}

/// Per-image anti-rollback state, persisted in the data store.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ImageMetadata {
    pub magic: u32,
    pub last_version: u32,
    pub last_issue_time: u32,
}

impl ImageMetadata {
    pub fn initial() -> Self {
        ImageMetadata {
            magic: LZ_MAGIC,
            last_version: 0,
            last_issue_time: 0,
        }
    }

    fn validate(&self) -> Result<(), ImageError> {
        if self.magic != LZ_MAGIC {
            return Err(ImageError::MetadataInvalid);
        }
        Ok(())
    }

    /// Updates the metadata to reflect a newly verified header. Callers
    /// must only call this after [`verify_image`] has succeeded.
    pub fn advance(&mut self, header: &ImageHeader) {
        self.magic = LZ_MAGIC;
        self.last_version = header.content.version;
        self.last_issue_time = header.content.issue_time;
    }
}

/// Verifies `header`/`image_bytes` against `metadata` and `code_authority`,
/// per the six checks in the image verifier: magic, layout, digest,
/// signature, metadata validity, and anti-rollback (version and issue-time
/// must both not regress; ties are allowed so the same image can be
/// re-verified).
pub fn verify_image(
    header: &ImageHeader,
    image_bytes: &[u8],
    code_authority: &PublicKey,
    metadata: &ImageMetadata,
) -> Result<(), ImageError> {
    let code = header.code_slice(image_bytes);
    let digest: Digest = sha256(code);
    if digest != header.content.digest {
        return Err(ImageError::BadDigest);
    }

    code_authority
        .verify(header.content.as_bytes(), &header.signature())
        .map_err(|_| ImageError::BadSignature)?;

    metadata.validate()?;

    if header.content.version < metadata.last_version
        || header.content.issue_time < metadata.last_issue_time
    {
        return Err(ImageError::Rollback);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lz_crypto::{sha256, Keypair};
    use rand_core::OsRng;

    fn build_image(code: &[u8], version: u32, issue_time: u32, signer: &Keypair) -> Vec<u8> {
        let mut rng = OsRng;
        let hdr_size = core::mem::size_of::<ImageHeader>();
        let content = ImageHeaderContent {
            magic: LZ_MAGIC,
            hdr_size: hdr_size as u32,
            size: code.len() as u32,
            name: [0u8; NAME_LEN],
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

    #[test]
    fn verify_accepts_well_formed_image() {
        let signer = Keypair::derive(&sha256(b"code authority")).unwrap();
        let bytes = build_image(b"firmware bytes go here", 1, 100, &signer);
        let header = ImageHeader::parse(&bytes).unwrap();
        let metadata = ImageMetadata::initial();
        verify_image(header, &bytes, &signer.public_key(), &metadata).unwrap();
    }

    #[test]
    fn verify_rejects_tampered_code() {
        let signer = Keypair::derive(&sha256(b"code authority")).unwrap();
        let mut bytes = build_image(b"firmware bytes go here", 1, 100, &signer);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let header = ImageHeader::parse(&bytes).unwrap();
        let metadata = ImageMetadata::initial();
        let result = verify_image(header, &bytes, &signer.public_key(), &metadata);
        assert_eq!(result, Err(ImageError::BadDigest));
    }

    #[test]
    fn verify_rejects_rollback() {
        let signer = Keypair::derive(&sha256(b"code authority")).unwrap();
        let bytes = build_image(b"firmware bytes go here", 1, 100, &signer);
        let header = ImageHeader::parse(&bytes).unwrap();
        let mut metadata = ImageMetadata::initial();
        metadata.advance(header);
        metadata.last_version = 5; // pretend a newer image was already seen

        let result = verify_image(header, &bytes, &signer.public_key(), &metadata);
        assert_eq!(result, Err(ImageError::Rollback));
    }

    #[test]
    fn verify_allows_reverifying_same_version() {
        let signer = Keypair::derive(&sha256(b"code authority")).unwrap();
        let bytes = build_image(b"firmware bytes go here", 3, 100, &signer);
        let header = ImageHeader::parse(&bytes).unwrap();
        let mut metadata = ImageMetadata::initial();
        metadata.advance(header);

        verify_image(header, &bytes, &signer.public_key(), &metadata).unwrap();
    }

    #[test]
    fn parse_rejects_header_whose_size_overruns_buffer() {
        let signer = Keypair::derive(&sha256(b"code authority")).unwrap();
        let mut bytes = build_image(b"firmware bytes go here", 1, 100, &signer);
        bytes.truncate(bytes.len() - 5);
        assert_eq!(ImageHeader::parse(&bytes), Err(ImageError::InvalidLength));
    }
}
