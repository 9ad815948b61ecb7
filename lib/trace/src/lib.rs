// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A tracing sink for the trusted boot kernel.
//!
//! The device has no console in the field, so this does not write bytes
//! anywhere: it records entries into a static ring buffer (see the `ringbuf`
//! crate) that a debugger or post-mortem crash-dump tool reads out of RAM.
//! With the `trace` feature disabled, every [`trace!`] call site compiles to
//! nothing, so turning tracing off removes the sink from the binary rather
//! than just quieting it.

#![no_std]

/// One entry recorded per interesting boot-state transition.
///
/// Kept small and `Copy` so it's cheap to drop into the ring buffer from any
/// call site, including ones on the fatal-halt path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    BootParamsInvalid,
    InitialBoot,
    NormalBoot,
    IdentityChanged,
    IdentityUnchanged,
    NotProvisioned,
    StagingElementSkipped(u8),
    StagingElementApplied(u8),
    UpdateApplyFailed(u8),
    ModeSelected(u8),
    ImageVerifyFailed(u8),
    AppRecovered,
    WatchdogArmed(u32),
    Fatal(u8),
}

#[cfg(feature = "trace")]
ringbuf::ringbuf!(Event, 64, Event::BootParamsInvalid);

/// Records `$event` into the kernel's trace ring buffer.
///
/// A no-op when the `trace` feature is disabled.
#[cfg(feature = "trace")]
#[macro_export]
macro_rules! trace {
    ($event:expr) => {
        $crate::ringbuf_entry($event)
    };
}

#[cfg(not(feature = "trace"))]
#[macro_export]
macro_rules! trace {
    ($event:expr) => {{
        let _ = &$event;
    }};
}

#[cfg(feature = "trace")]
#[doc(hidden)]
pub fn ringbuf_entry(event: Event) {
    ringbuf::ringbuf_entry!(event);
}

#[doc(hidden)]
pub use Event as TraceEvent;
