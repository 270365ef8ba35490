#![no_std]

// Shared logic for the Tentacle sensor node.
//
// Everything here is `no_std` so the duty-cycle scheduler, the response
// grammar, and the power sequencing rules compile unchanged for the STM32
// firmware and the host-side emulator.

pub mod bus;
pub mod channels;
pub mod power;
pub mod response;
pub mod scheduler;
pub mod telemetry;
