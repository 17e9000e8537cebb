// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Architecture boundary for context switching and interrupt control
//! OWNERS: @kernel-arch-team
//! PUBLIC API: InterruptControl, Arch; backends `arch::avr` (AVR targets), `arch::sim` (host tests)
//! DEPENDS_ON: error::SpawnError, types::TaskEntry
//! INVARIANTS: A switch saves the full callee-saved state plus SREG; only the
//!             running task and the switch routine touch a saved context

pub mod avr;

#[cfg(test)]
pub mod sim;

use crate::error::SpawnError;
use crate::types::TaskEntry;

/// Global interrupt enable flag of the single CPU.
pub trait InterruptControl: Sync {
    /// Masks interrupts and reports whether they were enabled before.
    fn disable_interrupts(&self) -> bool;

    /// Restores the state returned by [`disable_interrupts`](Self::disable_interrupts).
    fn restore_interrupts(&self, was_enabled: bool);

    fn interrupts_enabled(&self) -> bool;
}

/// Per-architecture task context support.
///
/// A switch is "save the running task, then restore another": `switch`
/// pushes the caller's registers and status onto its own stack, masks
/// interrupts, records the stack pointer in `from`, loads the stack pointer
/// in `to`, pops that task's registers and status and returns into it.
pub trait Arch: InterruptControl + 'static {
    /// Saved state of a suspended task.
    type Context: Send;

    /// Lays out a first-resume frame on `stack` so that restoring the
    /// returned context enters `entry` with interrupts enabled.
    fn init_context(
        &self,
        entry: TaskEntry,
        stack: &'static mut [u8],
    ) -> Result<Self::Context, SpawnError>;

    /// Suspends the caller into `from` and resumes `to`. Returns when some
    /// other task switches back to `from`.
    ///
    /// # Safety
    ///
    /// `from` must be the context slot of the running task and `to` a context
    /// produced by `init_context` or a previous `switch`. Nothing else may
    /// access either slot during the call.
    unsafe fn switch(&self, from: *mut Self::Context, to: *const Self::Context);

    /// Resumes `to` without saving the caller. Used once to enter tasking.
    ///
    /// # Safety
    ///
    /// Same requirements as `switch` for `to`.
    unsafe fn restore(&self, to: *const Self::Context) -> !;

    /// Enables the sleep instruction (idle sleep mode).
    fn arm_sleep(&self);

    fn disarm_sleep(&self);

    /// Enables interrupts and sleeps until one arrives, atomically: an
    /// interrupt that became pending while masked still wakes the CPU.
    /// Call with interrupts masked. Returns with interrupts enabled.
    fn wait_for_interrupt(&self);

    /// Saved stack pointer of a suspended task.
    fn stack_pointer(&self, context: &Self::Context) -> usize;

    /// Address the suspended task resumes at, read from its saved frame.
    fn resume_address(&self, context: &Self::Context) -> usize;
}
