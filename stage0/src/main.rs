// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The trusted-boot kernel binary: wires [`lz_boot_core::run`] up against
//! this platform's flash controller, watchdog, RNG, and RAM handoff
//! windows, then transfers control to whichever layer it chose.
//!
//! Everything that decides *what* to boot lives in `lz-boot-core`; this
//! binary only supplies the *how* for one specific chip.

#![no_main]
#![no_std]

extern crate panic_halt;

mod flash;
mod ram_window;
mod rng;
mod watchdog;

use cortex_m::peripheral::Peripherals as CorePeripherals;
use cortex_m_rt::entry;
use lz_boot_core::{BootMode, Outcome};
use lz_flash::Region;

use crate::flash::McuFlash;
use crate::ram_window::RamWindow;
use crate::rng::HwRng;
use crate::watchdog::McuWatchdog;

/// Fault handlers the ROM vector table points at before this binary takes
/// over interrupt handling. A fault this early means the device is in a
/// state none of the recovery logic above can reason about; looping here
/// leaves the external watchdog (if already armed from a prior boot) to
/// reset the device.
#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "C" fn MemoryManagement() {
    loop {}
}

#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "C" fn BusFault() {
    loop {}
}

#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "C" fn UsageFault() {
    loop {}
}

#[entry]
fn main() -> ! {
    // SAFETY: `main` runs once, before any other code touches these
    // peripherals, and never returns to a caller that could take them again.
    let device = unsafe { lpc55_pac::Peripherals::steal() };
    let _core = CorePeripherals::take().unwrap();

    let mut flash = unsafe { McuFlash::new(flash::linker_extents()) };
    let mut watchdog = McuWatchdog::new(&device.WWDT);
    let mut rng = HwRng::new(&device.RNG);

    let mut boot_params_window = unsafe { RamWindow::boot_param_window() };
    let mut next_layer_window = unsafe { RamWindow::next_layer_params() };
    let mut cert_store_window = unsafe { RamWindow::cert_store() };

    let core_image_header = unsafe { core_image_header_bytes() };

    let outcome = lz_boot_core::run(
        boot_params_window.as_mut_bytes(),
        &mut flash,
        &mut watchdog,
        &mut next_layer_window,
        &mut cert_store_window,
        &mut rng,
        core_image_header,
    );

    match outcome {
        Outcome::Booted(mode) => {
            // SAFETY: `run` only returns `Booted` after verifying the
            // chosen region's image header and digest; its code segment is
            // a validated ARMv8-M image starting with an SP/PC pair.
            unsafe { jump_to(region_for(mode, &flash)) }
        }
        Outcome::Blocked => loop {
            cortex_m::asm::wfi();
        },
        Outcome::Fatal(_) => loop {
            cortex_m::asm::wfi();
        },
    }
}

fn region_for(mode: BootMode, flash: &McuFlash) -> &[u8] {
    use lz_flash::FlashRegion;
    let region = match mode {
        BootMode::App => Region::AppImage,
        BootMode::UpdateDownloader => Region::UpdateDownloaderImage,
        BootMode::CorePatcher => Region::CorePatcherImage,
    };
    flash.as_slice(region)
}

/// Reads the core's own image header, which lives outside any region
/// `lz-boot-core` is allowed to write, to confirm provisioning.
unsafe fn core_image_header_bytes() -> &'static [u8] {
    extern "C" {
        static address_of_core_image: u32;
        static address_of_core_image_end: u32;
    }
    let start = &address_of_core_image as *const u32 as usize;
    let end = &address_of_core_image_end as *const u32 as usize;
    core::slice::from_raw_parts(start as *const u8, end - start)
}

/// Transfers control to a verified layer's image. The ARMv8-M convention
/// this platform uses puts the initial stack pointer and the reset vector
/// back-to-back at the very start of the code segment, exactly like the
/// ROM-loaded vector table this binary itself was entered through.
unsafe fn jump_to(image: &[u8]) -> ! {
    let sp = u32::from_le_bytes(image[0..4].try_into().unwrap());
    let pc = u32::from_le_bytes(image[4..8].try_into().unwrap());

    cortex_m::asm::dsb();
    cortex_m::asm::isb();
    core::arch::asm!(
        "msr msp, {sp}",
        "bx {pc}",
        sp = in(reg) sp,
        pc = in(reg) pc,
        options(noreturn),
    );
}
