// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A [`rand_core::CryptoRngCore`] backed by the LPC55's on-chip true random
//! number generator.
//!
//! The only place this engine draws randomness from is ECDSA's per-signature
//! nonce (§4.2); it never seeds a key derivation from it. The RNG is owned
//! for the duration of one boot and never touched again after handoff (§5).

use lpc55_pac::rng::RegisterBlock;
use rand_core::{CryptoRng, Error, RngCore};

pub struct HwRng<'a> {
    reg: &'a RegisterBlock,
}

impl<'a> HwRng<'a> {
    pub fn new(reg: &'a RegisterBlock) -> Self {
        HwRng { reg }
    }

    fn next_word(&mut self) -> u32 {
        while !self.reg.counter_val.read().refresh_cnt().bit() {
            // spin until the online health test latches a fresh output word
        }
        self.reg.random_number.read().bits()
    }
}

impl<'a> RngCore for HwRng<'a> {
    fn next_u32(&mut self) -> u32 {
        self.next_word()
    }

    fn next_u64(&mut self) -> u64 {
        let lo = self.next_word() as u64;
        let hi = self.next_word() as u64;
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut chunks = dest.chunks_exact_mut(4);
        for chunk in &mut chunks {
            chunk.copy_from_slice(&self.next_word().to_ne_bytes());
        }
        let rem = chunks.into_remainder();
        if !rem.is_empty() {
            let word = self.next_word().to_ne_bytes();
            rem.copy_from_slice(&word[..rem.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Marker: this is a hardware TRNG, not a PRNG seeded from one.
impl<'a> CryptoRng for HwRng<'a> {}
