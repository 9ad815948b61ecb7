// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! DeviceID, AliasID, and `dev_auth` derivation.
//!
//! All three come out of the same narrow crypto facade so the curve, hash,
//! and derivation scheme stay in exactly one place ([`lz_crypto`]).

use crate::Error;
use lz_crypto::{hmac_sha256_two_parts, sha256_two_parts, Digest, Keypair};

/// Derives DeviceID from the seed handed down by the pre-boot stage.
/// Stable across boots as long as `cdi_prime` is stable.
pub fn derive_device_id(cdi_prime: &Digest) -> Result<Keypair, Error> {
    Keypair::derive(cdi_prime).map_err(|_| Error::InvalidInput)
}

/// Derives AliasID from the next layer's measured code digest and the
/// DeviceID private key's PEM encoding. Re-derived every boot, so it
/// changes whenever either input changes (§8 property 2).
///
/// The distilled source took `sizeof(digest)` of a pointer-typed parameter
/// here, effectively hashing only a pointer's worth of bytes; this is the
/// intended semantics instead: the full digest.
pub fn derive_alias_id(next_layer_digest: &Digest, deviceid_priv_pem: &str) -> Result<Keypair, Error> {
    let seed = sha256_two_parts(next_layer_digest, deviceid_priv_pem.as_bytes());
    Keypair::derive(&seed).map_err(|_| Error::InvalidInput)
}

/// Binds the DeviceID public key to `dev_uuid` under the pre-boot stage's
/// `core_auth` key. Only handed to layers that can perform device
/// reassociation (update-downloader, core-patcher).
pub fn derive_dev_auth(core_auth: &[u8; 32], deviceid_pub_pem: &str, dev_uuid: &[u8; 16]) -> [u8; 32] {
    hmac_sha256_two_parts(core_auth, deviceid_pub_pem.as_bytes(), dev_uuid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lz_crypto::sha256;

    #[test]
    fn device_id_is_deterministic_in_the_seed() {
        let seed = sha256(b"compound device identifier");
        let a = derive_device_id(&seed).unwrap();
        let b = derive_device_id(&seed).unwrap();
        assert_eq!(a.public_key().to_sec1_bytes(), b.public_key().to_sec1_bytes());
    }

    #[test]
    fn alias_id_changes_with_either_input() {
        let device_id = derive_device_id(&sha256(b"cdi-one")).unwrap();
        let mut priv_pem_buf = [0u8; 256];
        let priv_pem = device_id.private_to_pem(&mut priv_pem_buf).unwrap();

        let image_digest_a = sha256(b"image-a");
        let image_digest_b = sha256(b"image-b");

        let alias_a = derive_alias_id(&image_digest_a, priv_pem).unwrap();
        let alias_a_again = derive_alias_id(&image_digest_a, priv_pem).unwrap();
        let alias_b = derive_alias_id(&image_digest_b, priv_pem).unwrap();

        assert_eq!(
            alias_a.public_key().to_sec1_bytes(),
            alias_a_again.public_key().to_sec1_bytes()
        );
        assert_ne!(
            alias_a.public_key().to_sec1_bytes(),
            alias_b.public_key().to_sec1_bytes()
        );

        let other_device_id = derive_device_id(&sha256(b"cdi-two")).unwrap();
        let other_priv_pem = other_device_id.private_to_pem(&mut priv_pem_buf).unwrap();
        let alias_other_device = derive_alias_id(&image_digest_a, other_priv_pem).unwrap();
        assert_ne!(
            alias_a.public_key().to_sec1_bytes(),
            alias_other_device.public_key().to_sec1_bytes()
        );
    }

    #[test]
    fn dev_auth_is_sensitive_to_every_input() {
        let key = [1u8; 32];
        let uuid_a = [2u8; 16];
        let uuid_b = [3u8; 16];
        let a = derive_dev_auth(&key, "pub-pem-one", &uuid_a);
        let b = derive_dev_auth(&key, "pub-pem-one", &uuid_b);
        let c = derive_dev_auth(&key, "pub-pem-two", &uuid_a);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
