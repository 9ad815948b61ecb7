// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Narrow cryptographic facade used throughout the trusted boot kernel.
//!
//! This is a thin wrapper over RustCrypto primitives, not a reimplementation
//! of them: hashing is `sha2`, keyed hashing is `hmac`, and signing is
//! `p256`/`ecdsa`. Callers never reach for these crates directly so that the
//! choice of curve and hash function stays in exactly one place.

#![cfg_attr(not(test), no_std)]

use ecdsa::signature::{DigestVerifier, RandomizedDigestSigner};
use elliptic_curve::sec1::ToEncodedPoint;
use hmac::Mac;
use p256::ecdsa::{Signature as P256Signature, SigningKey, VerifyingKey};
use p256::SecretKey;
use rand_core::CryptoRngCore;
use sha2::{Digest as _, Sha256};
use zeroize::Zeroizing;

pub const DIGEST_LEN: usize = 32;
pub const SEC1_PUBLIC_KEY_LEN: usize = 33; // compressed point
pub const SIGNATURE_LEN: usize = 64; // fixed-width r || s encoding

pub type Digest = [u8; DIGEST_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// A seed could not be interpreted as a valid scalar for the curve.
    InvalidSeed,
    /// A SEC1-encoded point was malformed or not on the curve.
    InvalidPublicKey,
    /// A signature was not exactly [`SIGNATURE_LEN`] bytes, or did not parse.
    InvalidSignature,
    /// ECDSA verification failed.
    BadSignature,
    /// A PEM blob did not decode, or decoded to the wrong length.
    InvalidPem,
    /// A PEM-encoding output buffer was too small for the value.
    BufferTooSmall,
}

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> Digest {
    Sha256::digest(data).into()
}

/// SHA-256 of `a` immediately followed by `b`, without requiring the caller
/// to concatenate them into one buffer first.
pub fn sha256_two_parts(a: &[u8], b: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

/// HMAC-SHA-256 of `data` under `key`.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Digest {
    let mut mac = hmac::Hmac::<Sha256>::new_from_slice(key)
        .expect("HMAC-SHA-256 accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// HMAC-SHA-256 of `a` immediately followed by `b`, under `key`. Used for
/// `dev_auth`, which binds two fields the caller never has contiguous in
/// memory (a PEM string and a fixed-size UUID).
pub fn hmac_sha256_two_parts(key: &[u8], a: &[u8], b: &[u8]) -> Digest {
    let mut mac = hmac::Hmac::<Sha256>::new_from_slice(key)
        .expect("HMAC-SHA-256 accepts any key length");
    mac.update(a);
    mac.update(b);
    mac.finalize().into_bytes().into()
}

/// A fixed-size ECDSA signature, encoded as the concatenation of the scalars
/// `r` and `s` (no ASN.1/DER framing, so it fits a fixed-layout header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    pub fn from_bytes(bytes: &[u8; SIGNATURE_LEN]) -> Self {
        Signature(*bytes)
    }

    fn to_p256(self) -> Result<P256Signature, CryptoError> {
        P256Signature::from_slice(&self.0).map_err(|_| CryptoError::InvalidSignature)
    }
}

/// An ECDSA P-256 key pair, deterministically derived from a seed.
///
/// The private scalar lives in a [`Zeroizing`] buffer for as long as this
/// value exists; dropping a `Keypair` scrubs it.
pub struct Keypair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl Keypair {
    /// Deterministically derives a key pair from a 32-byte seed.
    ///
    /// Identical seeds always yield byte-identical key pairs; this is the
    /// basis of DeviceID and AliasID derivation.
    pub fn derive(seed: &Digest) -> Result<Self, CryptoError> {
        let seed = Zeroizing::new(*seed);
        let secret = SecretKey::from_bytes((&*seed).into())
            .map_err(|_| CryptoError::InvalidSeed)?;
        let signing_key = SigningKey::from(&secret);
        let verifying_key = VerifyingKey::from(&signing_key);
        Ok(Keypair {
            signing_key,
            verifying_key,
        })
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.verifying_key)
    }

    /// Signs `data` (hashed internally with SHA-256) using nonce material
    /// drawn from `rng`.
    pub fn sign(&self, data: &[u8], rng: &mut impl CryptoRngCore) -> Signature {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let sig: P256Signature = self.signing_key.sign_digest_with_rng(rng, hasher);
        let mut out = [0u8; SIGNATURE_LEN];
        out.copy_from_slice(&sig.to_bytes());
        Signature(out)
    }

    /// Encodes the private scalar as a PKCS#8 PEM block into `out`, returning
    /// the slice of `out` that was written. The caller is responsible for
    /// zeroizing `out` once it is no longer needed.
    pub fn private_to_pem<'a>(&self, out: &'a mut [u8]) -> Result<&'a str, CryptoError> {
        pem_encode_sec1(
            "EC PRIVATE KEY",
            &Zeroizing::new(self.signing_key.to_bytes()),
            out,
        )
    }

    /// Decodes a `private_to_pem`-encoded key pair back into a [`Keypair`].
    pub fn private_from_pem(pem: &str) -> Result<Self, CryptoError> {
        let mut buf = Zeroizing::new([0u8; 32]);
        let (label, der) =
            pem_rfc7468::decode(pem.as_bytes(), &mut *buf).map_err(|_| CryptoError::InvalidPem)?;
        if label != "EC PRIVATE KEY" {
            return Err(CryptoError::InvalidPem);
        }
        let seed: Digest = der.try_into().map_err(|_| CryptoError::InvalidPem)?;
        Keypair::derive(&seed)
    }
}

/// An ECDSA P-256 public key.
#[derive(Clone, Copy)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        VerifyingKey::from_sec1_bytes(bytes)
            .map(PublicKey)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Compressed SEC1 point encoding, [`SEC1_PUBLIC_KEY_LEN`] bytes.
    pub fn to_sec1_bytes(&self) -> [u8; SEC1_PUBLIC_KEY_LEN] {
        let point = self.0.to_encoded_point(true);
        let mut out = [0u8; SEC1_PUBLIC_KEY_LEN];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// Verifies `sig` over `data` (hashed internally with SHA-256).
    pub fn verify(&self, data: &[u8], sig: &Signature) -> Result<(), CryptoError> {
        let sig = sig.to_p256()?;
        let mut hasher = Sha256::new();
        hasher.update(data);
        self.0
            .verify_digest(hasher, &sig)
            .map_err(|_| CryptoError::BadSignature)
    }

    /// Encodes the public key as a SubjectPublicKeyInfo PEM block into `out`.
    pub fn to_pem<'a>(&self, out: &'a mut [u8]) -> Result<&'a str, CryptoError> {
        pem_encode_sec1("PUBLIC KEY", &self.to_sec1_bytes(), out)
    }

    /// Decodes a `to_pem`-encoded public key back into a [`PublicKey`].
    ///
    /// Used when reloading the trust-anchor keys (DeviceID, management,
    /// code-authority) from their persisted PEM form in the data store.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let mut buf = [0u8; SEC1_PUBLIC_KEY_LEN];
        let (label, der) =
            pem_rfc7468::decode(pem.as_bytes(), &mut buf).map_err(|_| CryptoError::InvalidPem)?;
        if label != "PUBLIC KEY" {
            return Err(CryptoError::InvalidPem);
        }
        Self::from_sec1_bytes(der)
    }
}

fn pem_encode_sec1<'a>(
    label: &str,
    der_like: &[u8],
    out: &'a mut [u8],
) -> Result<&'a str, CryptoError> {
    pem_rfc7468::encode(label, pem_rfc7468::LineEnding::LF, der_like, out)
        .map_err(|_| CryptoError::BufferTooSmall)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn derive_keypair_is_deterministic() {
        let seed = sha256(b"some seed material");
        let a = Keypair::derive(&seed).unwrap();
        let b = Keypair::derive(&seed).unwrap();
        assert_eq!(a.public_key().to_sec1_bytes(), b.public_key().to_sec1_bytes());
    }

    #[test]
    fn different_seeds_yield_different_keys() {
        let a = Keypair::derive(&sha256(b"a")).unwrap();
        let b = Keypair::derive(&sha256(b"b")).unwrap();
        assert_ne!(a.public_key().to_sec1_bytes(), b.public_key().to_sec1_bytes());
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let kp = Keypair::derive(&sha256(b"device identity seed")).unwrap();
        let mut rng = OsRng;
        let sig = kp.sign(b"a message to authenticate", &mut rng);
        kp.public_key()
            .verify(b"a message to authenticate", &sig)
            .unwrap();
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let kp = Keypair::derive(&sha256(b"device identity seed")).unwrap();
        let mut rng = OsRng;
        let sig = kp.sign(b"original message", &mut rng);
        let result = kp.public_key().verify(b"tampered message", &sig);
        assert_eq!(result, Err(CryptoError::BadSignature));
    }

    #[test]
    fn public_key_pem_round_trips() {
        let kp = Keypair::derive(&sha256(b"device identity seed")).unwrap();
        let mut buf = [0u8; 256];
        let pem = kp.public_key().to_pem(&mut buf).unwrap();
        let decoded = PublicKey::from_pem(pem).unwrap();
        assert_eq!(decoded.to_sec1_bytes(), kp.public_key().to_sec1_bytes());
    }

    #[test]
    fn private_key_pem_round_trips() {
        let kp = Keypair::derive(&sha256(b"device identity seed")).unwrap();
        let mut buf = [0u8; 256];
        let pem = kp.private_to_pem(&mut buf).unwrap();
        let decoded = Keypair::private_from_pem(pem).unwrap();
        assert_eq!(
            decoded.public_key().to_sec1_bytes(),
            kp.public_key().to_sec1_bytes()
        );
    }

    #[test]
    fn hmac_is_deterministic_and_key_sensitive() {
        let a = hmac_sha256(b"key-one", b"data");
        let b = hmac_sha256(b"key-one", b"data");
        let c = hmac_sha256(b"key-two", b"data");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn hmac_two_parts_matches_concatenated_single_part() {
        let combined = hmac_sha256(b"key", b"helloworld");
        let split = hmac_sha256_two_parts(b"key", b"hello", b"world");
        assert_eq!(combined, split);
    }
}
