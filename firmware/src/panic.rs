use core::panic::PanicInfo;

use cortex_m::peripheral::SCB;
use defmt::error;

/// Logs the panic and resets, so the node resumes duty cycling from boot.
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    error!("panic: {}", defmt::Display2Format(info));
    SCB::sys_reset();
}
