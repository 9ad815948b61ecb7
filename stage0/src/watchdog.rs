// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`lz_boot_core::Watchdog`] backed by the LPC55's windowed watchdog timer.
//!
//! The WWDT's clock runs at a fixed, slow rate, so `deferral_seconds` has to
//! be converted into timer counts before being latched. Once `feed` is
//! called the watchdog starts counting down on its own; there is no API to
//! un-arm it, matching the "cannot be stopped" contract in the design.

use lz_boot_core::Watchdog;

/// WWDT input clock after its fixed prescaler, in Hz, on this platform's
/// reference clock configuration.
const WWDT_CLOCK_HZ: u32 = 1_000_000;

pub struct McuWatchdog<'a> {
    reg: &'a lpc55_pac::wwdt::RegisterBlock,
}

impl<'a> McuWatchdog<'a> {
    pub fn new(reg: &'a lpc55_pac::wwdt::RegisterBlock) -> Self {
        McuWatchdog { reg }
    }
}

impl<'a> Watchdog for McuWatchdog<'a> {
    fn arm(&mut self, deferral_seconds: u32) {
        let counts = deferral_seconds.saturating_mul(WWDT_CLOCK_HZ).max(1);
        self.reg.tc.write(|w| unsafe { w.count().bits(counts) });
        self.reg.mod_.write(|w| w.wden().set_bit().wdreset().set_bit());
        // Feeding starts the countdown; per the WWDT's design, once started
        // the only way to avoid a reset is another feed before `tc` expires.
        self.reg.feed.write(|w| unsafe { w.feed().bits(0xAA) });
        self.reg.feed.write(|w| unsafe { w.feed().bits(0x55) });
    }
}
