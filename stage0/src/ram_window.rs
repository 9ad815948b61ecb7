// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed-address RAM windows: the input boot parameters this binary reads,
//! and the output windows (next-layer boot parameters, image cert store) it
//! writes before handoff. All three addresses come from the linker script,
//! never a literal in this module, per the platform's addressing contract.

use lz_handoff::HandoffWindow;

/// A raw, fixed-address, fixed-length RAM span. Three instances of this
/// back the three windows in §6: none of them owns an allocation, they are
/// views over memory the linker script places.
pub struct RamWindow {
    base: *mut u8,
    len: usize,
}

impl RamWindow {
    /// # Safety
    /// `base`/`len` must describe a RAM range nothing else is concurrently
    /// accessing for the lifetime of the returned value.
    unsafe fn at(start: &u32, end: &u32) -> Self {
        let base = start as *const u32 as *mut u8;
        let len = (end as *const u32 as usize) - (start as *const u32 as usize);
        RamWindow { base, len }
    }

    /// # Safety
    /// Must be called at most once per boot, before the pre-boot stage's
    /// contents are read; see [`crate::main`].
    pub unsafe fn boot_param_window() -> Self {
        extern "C" {
            static address_of_boot_param_window: u32;
            static address_of_boot_param_window_end: u32;
        }
        Self::at(&address_of_boot_param_window, &address_of_boot_param_window_end)
    }

    /// # Safety
    /// Must be called at most once per boot; this window physically
    /// overlaps the input boot-parameter window on this platform (§4.8),
    /// so holding both simultaneously as anything but opaque byte spans
    /// would be unsound.
    pub unsafe fn next_layer_params() -> Self {
        extern "C" {
            static address_of_next_layer_params: u32;
            static address_of_next_layer_params_end: u32;
        }
        Self::at(&address_of_next_layer_params, &address_of_next_layer_params_end)
    }

    /// # Safety
    /// Must be called at most once per boot.
    pub unsafe fn cert_store() -> Self {
        extern "C" {
            static address_of_cert_store: u32;
            static address_of_cert_store_end: u32;
        }
        Self::at(&address_of_cert_store, &address_of_cert_store_end)
    }

    /// Borrows the whole window as a mutable byte slice. Used directly for
    /// the input boot-parameter window, which `lz_boot_core::run` parses,
    /// validates, and zeroizes in place.
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        // SAFETY: `base`/`len` describe a RAM range exclusively owned by
        // this `RamWindow` for its lifetime, per the safety contract on the
        // constructors above.
        unsafe { core::slice::from_raw_parts_mut(self.base, self.len) }
    }
}

impl HandoffWindow for RamWindow {
    fn zero(&mut self) {
        self.as_mut_bytes().fill(0);
    }

    fn write(&mut self, bytes: &[u8]) {
        let dst = self.as_mut_bytes();
        debug_assert!(bytes.len() <= dst.len());
        let n = bytes.len().min(dst.len());
        dst[..n].copy_from_slice(&bytes[..n]);
    }
}
