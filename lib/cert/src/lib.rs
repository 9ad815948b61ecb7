// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Certificate and CSR construction for the DICE identity chain.
//!
//! Every certificate in this system is tiny and fixed-shape: one subject
//! common name, one EC public key, an optional firmware-ID extension, and a
//! signature. Rather than patch byte ranges of a pre-baked DER blob, these
//! are built as real (if minimal) DER `SEQUENCE`s via the `der` crate's
//! derive macros and signed with [`lz_crypto`]. The builder API still reads
//! like the fixed-offset builders elsewhere in this codebase: each `set_*`
//! consumes and returns `Self`, and `sign` is the terminal step.

#![cfg_attr(not(test), no_std)]

use der::asn1::{OctetStringRef, Uint, Utf8StringRef};
use der::{Encode, Sequence};
use lz_crypto::{Keypair, PublicKey, Signature};
use rand_core::CryptoRngCore;

pub const MAX_CERT_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertError {
    /// The encoded certificate did not fit in the caller's buffer.
    BufferTooSmall,
    /// The DER encoder rejected a field (should not happen for our fixed,
    /// short inputs; surfaced rather than panicked on).
    Malformed,
}

impl From<der::Error> for CertError {
    fn from(_: der::Error) -> Self {
        CertError::Malformed
    }
}

#[derive(Sequence)]
struct TbsCert<'a> {
    serial_number: Uint,
    issuer_cn: Utf8StringRef<'a>,
    subject_cn: Utf8StringRef<'a>,
    subject_public_key: OctetStringRef<'a>,
    /// Firmware ID measurement, present only on AliasID certificates.
    fwid: Option<OctetStringRef<'a>>,
}

#[derive(Sequence)]
struct Cert<'a> {
    tbs_bytes: OctetStringRef<'a>,
    signature: OctetStringRef<'a>,
}

#[derive(Sequence)]
struct TbsCsr<'a> {
    serial_number: Uint,
    subject_cn: Utf8StringRef<'a>,
    public_key: OctetStringRef<'a>,
}

#[derive(Sequence)]
struct Csr<'a> {
    tbs_bytes: OctetStringRef<'a>,
    /// Self-signature proving possession of the corresponding private key.
    signature: OctetStringRef<'a>,
}

/// Builds one DICE-chain certificate: a subject CN, an issuer CN, the
/// subject's public key, an optional FWID extension, and a signature by the
/// issuer's key.
pub struct CertBuilder<'a> {
    serial_number: u32,
    issuer_cn: &'a str,
    subject_cn: &'a str,
    subject_pub: [u8; lz_crypto::SEC1_PUBLIC_KEY_LEN],
    fwid: Option<[u8; 32]>,
}

impl<'a> CertBuilder<'a> {
    pub fn new(serial_number: u32, issuer_cn: &'a str, subject_cn: &'a str, subject_pub: &PublicKey) -> Self {
        CertBuilder {
            serial_number,
            issuer_cn,
            subject_cn,
            subject_pub: subject_pub.to_sec1_bytes(),
            fwid: None,
        }
    }

    /// Attaches the next-layer firmware measurement. Only meaningful on an
    /// AliasID certificate.
    pub fn set_fwid(mut self, fwid: [u8; 32]) -> Self {
        self.fwid = Some(fwid);
        self
    }

    /// Signs the certificate with `issuer` and encodes it into `out`,
    /// returning the written slice.
    pub fn sign<'b>(
        self,
        issuer: &Keypair,
        rng: &mut impl CryptoRngCore,
        out: &'b mut [u8; MAX_CERT_LEN],
    ) -> Result<&'b [u8], CertError> {
        let fwid_ref = self.fwid.as_ref().map(|f| OctetStringRef::new(f)).transpose()?;
        let tbs = TbsCert {
            serial_number: Uint::new(&self.serial_number.to_be_bytes())?,
            issuer_cn: Utf8StringRef::new(self.issuer_cn)?,
            subject_cn: Utf8StringRef::new(self.subject_cn)?,
            subject_public_key: OctetStringRef::new(&self.subject_pub)?,
            fwid: fwid_ref,
        };

        let mut tbs_buf = [0u8; MAX_CERT_LEN];
        let tbs_len = tbs.encode_to_slice(&mut tbs_buf)?.len();
        let tbs_bytes = &tbs_buf[..tbs_len];

        let sig = issuer.sign(tbs_bytes, rng);

        let cert = Cert {
            tbs_bytes: OctetStringRef::new(tbs_bytes)?,
            signature: OctetStringRef::new(sig.as_bytes())?,
        };
        let written = cert.encode_to_slice(out)?;
        Ok(written)
    }
}

/// Verifies a certificate built by [`CertBuilder`] against an issuer public
/// key, returning the subject's public key and the parsed subject CN on
/// success.
pub fn verify_cert<'a>(
    encoded: &'a [u8],
    issuer_pub: &PublicKey,
) -> Result<(PublicKey, &'a str, Option<[u8; 32]>), CertError> {
    let cert = Cert::from_der(encoded).map_err(|_| CertError::Malformed)?;
    let sig_bytes: [u8; 64] = cert
        .signature
        .as_bytes()
        .try_into()
        .map_err(|_| CertError::Malformed)?;
    let sig = Signature::from_bytes(&sig_bytes);
    issuer_pub
        .verify(cert.tbs_bytes.as_bytes(), &sig)
        .map_err(|_| CertError::Malformed)?;

    let tbs = TbsCert::from_der(cert.tbs_bytes.as_bytes()).map_err(|_| CertError::Malformed)?;
    let subject_pub = PublicKey::from_sec1_bytes(tbs.subject_public_key.as_bytes())
        .map_err(|_| CertError::Malformed)?;
    let fwid = tbs
        .fwid
        .map(|f| f.as_bytes().try_into())
        .transpose()
        .map_err(|_| CertError::Malformed)?;
    Ok((subject_pub, tbs.subject_cn.as_str(), fwid))
}

/// Verifies a self-signed CSR built by [`CsrBuilder`], returning the
/// requester's public key and subject CN on success.
pub fn verify_csr(encoded: &[u8]) -> Result<(PublicKey, &str), CertError> {
    let csr = Csr::from_der(encoded).map_err(|_| CertError::Malformed)?;
    let tbs = TbsCsr::from_der(csr.tbs_bytes.as_bytes()).map_err(|_| CertError::Malformed)?;
    let subject_pub = PublicKey::from_sec1_bytes(tbs.public_key.as_bytes())
        .map_err(|_| CertError::Malformed)?;

    let sig_bytes: [u8; 64] = csr
        .signature
        .as_bytes()
        .try_into()
        .map_err(|_| CertError::Malformed)?;
    let sig = Signature::from_bytes(&sig_bytes);
    subject_pub
        .verify(csr.tbs_bytes.as_bytes(), &sig)
        .map_err(|_| CertError::Malformed)?;

    Ok((subject_pub, tbs.subject_cn.as_str()))
}

/// Derives a serial number from a public key's SEC1 bytes, the same way a
/// CSR's and an AliasID certificate's serial are both produced from the
/// subject key they carry.
pub fn serial_from_pubkey(bytes: &[u8; lz_crypto::SEC1_PUBLIC_KEY_LEN]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Builds a self-signed CSR: subject CN, the requester's own public key,
/// signed by the requester's own private key as proof of possession.
pub struct CsrBuilder<'a> {
    serial_number: u32,
    subject_cn: &'a str,
    subject_pub: [u8; lz_crypto::SEC1_PUBLIC_KEY_LEN],
}

impl<'a> CsrBuilder<'a> {
    /// The serial number is derived from the subject's own public key bytes,
    /// same as an AliasID certificate's serial.
    pub fn new(subject_cn: &'a str, subject: &Keypair) -> Self {
        let subject_pub = subject.public_key().to_sec1_bytes();
        CsrBuilder {
            serial_number: serial_from_pubkey(&subject_pub),
            subject_cn,
            subject_pub,
        }
    }

    pub fn sign<'b>(
        self,
        subject: &Keypair,
        rng: &mut impl CryptoRngCore,
        out: &'b mut [u8; MAX_CERT_LEN],
    ) -> Result<&'b [u8], CertError> {
        let tbs = TbsCsr {
            serial_number: Uint::new(&self.serial_number.to_be_bytes())?,
            subject_cn: Utf8StringRef::new(self.subject_cn)?,
            public_key: OctetStringRef::new(&self.subject_pub)?,
        };
        let mut tbs_buf = [0u8; MAX_CERT_LEN];
        let tbs_len = tbs.encode_to_slice(&mut tbs_buf)?.len();
        let tbs_bytes = &tbs_buf[..tbs_len];

        let sig = subject.sign(tbs_bytes, rng);

        let csr = Csr {
            tbs_bytes: OctetStringRef::new(tbs_bytes)?,
            signature: OctetStringRef::new(sig.as_bytes())?,
        };
        let written = csr.encode_to_slice(out)?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lz_crypto::sha256;
    use rand_core::OsRng;

    #[test]
    fn cert_round_trips_through_sign_and_verify() {
        let issuer = Keypair::derive(&sha256(b"deviceid seed")).unwrap();
        let subject = Keypair::derive(&sha256(b"aliasid seed")).unwrap();
        let mut rng = OsRng;

        let mut buf = [0u8; MAX_CERT_LEN];
        let encoded = CertBuilder::new(1, "DeviceID", "AliasID", &subject.public_key())
            .set_fwid([0x11; 32])
            .sign(&issuer, &mut rng, &mut buf)
            .unwrap();

        let (subject_pub, cn, fwid) = verify_cert(encoded, &issuer.public_key()).unwrap();
        assert_eq!(subject_pub.to_sec1_bytes(), subject.public_key().to_sec1_bytes());
        assert_eq!(cn, "AliasID");
        assert_eq!(fwid, Some([0x11; 32]));
    }

    #[test]
    fn cert_fails_verification_under_wrong_issuer() {
        let issuer = Keypair::derive(&sha256(b"deviceid seed")).unwrap();
        let wrong_issuer = Keypair::derive(&sha256(b"not the issuer")).unwrap();
        let subject = Keypair::derive(&sha256(b"aliasid seed")).unwrap();
        let mut rng = OsRng;

        let mut buf = [0u8; MAX_CERT_LEN];
        let encoded = CertBuilder::new(1, "DeviceID", "AliasID", &subject.public_key())
            .sign(&issuer, &mut rng, &mut buf)
            .unwrap();

        assert!(verify_cert(encoded, &wrong_issuer.public_key()).is_err());
    }

    #[test]
    fn csr_is_self_signed_proof_of_possession() {
        let subject = Keypair::derive(&sha256(b"deviceid seed")).unwrap();
        let mut rng = OsRng;
        let mut buf = [0u8; MAX_CERT_LEN];
        let encoded = CsrBuilder::new("DeviceID", &subject)
            .sign(&subject, &mut rng, &mut buf)
            .unwrap();

        let (subject_pub, cn) = verify_csr(encoded).unwrap();
        assert_eq!(subject_pub.to_sec1_bytes(), subject.public_key().to_sec1_bytes());
        assert_eq!(cn, "DeviceID");
    }

    #[test]
    fn csr_serial_is_derived_from_the_subject_public_key() {
        let subject = Keypair::derive(&sha256(b"deviceid seed")).unwrap();
        let mut rng = OsRng;
        let mut buf = [0u8; MAX_CERT_LEN];
        let encoded = CsrBuilder::new("DeviceID", &subject)
            .sign(&subject, &mut rng, &mut buf)
            .unwrap();

        let csr = Csr::from_der(encoded).unwrap();
        let tbs = TbsCsr::from_der(csr.tbs_bytes.as_bytes()).unwrap();
        // DER unsigned-integer encoding may prepend a sign-disambiguating
        // zero byte, so right-align into a u32 rather than assume 4 bytes.
        let raw = tbs.serial_number.as_bytes();
        let n = raw.len().min(4);
        let mut bytes = [0u8; 4];
        bytes[4 - n..].copy_from_slice(&raw[raw.len() - n..]);
        assert_eq!(u32::from_be_bytes(bytes), serial_from_pubkey(&subject.public_key().to_sec1_bytes()));
    }
}
