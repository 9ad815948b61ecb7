// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The watchdog peripheral boundary. The concrete timer driver is out of
//! scope for this engine; only the "armed exactly once, near the end of a
//! successful boot" contract lives here.

/// Arms the external watchdog timer. Once armed, it cannot be stopped:
/// the device resets into the pre-boot stage if the next layer doesn't
/// reach the management service within `deferral_seconds`.
pub trait Watchdog {
    fn arm(&mut self, deferral_seconds: u32);
}

#[cfg(any(test, feature = "std"))]
pub mod mock {
    use super::Watchdog;

    /// A host-side double that records whether and with what argument it
    /// was armed, instead of actually starting a timer.
    #[derive(Debug, Default)]
    pub struct RecordingWatchdog {
        pub armed_with: Option<u32>,
    }

    impl Watchdog for RecordingWatchdog {
        fn arm(&mut self, deferral_seconds: u32) {
            self.armed_with = Some(deferral_seconds);
        }
    }
}
