// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! AVR (ATmega328P class) backend.
//!
//! The frame layout in [`frame`] is host-checkable. The register-level code
//! below only builds for `target_arch = "avr"`; host builds use the
//! simulator backend in tests instead.

pub mod frame;

#[cfg(target_arch = "avr")]
pub use self::imp::{Avr, StackPointer};

#[cfg(target_arch = "avr")]
mod imp {
    use core::arch::asm;

    use relay_hal::{ByteRegisters, Mmio};

    use super::frame::{self, Sreg};
    use crate::arch::{Arch, InterruptControl};
    use crate::error::SpawnError;
    use crate::types::TaskEntry;

    /// Sleep mode control register (data-space address).
    const SMCR: usize = 0x53;
    /// SE=1 with SM=000 selects idle sleep, which keeps timers and USART running.
    const SMCR_IDLE_ENABLE: u8 = 0x01;

    // Push order must match `frame`: r0, SREG, r1, r2..r17, r28, r29.
    // Arguments follow the avr-gcc ABI: first in r25:r24, second in r23:r22.
    core::arch::global_asm!(
        r#"
        .section .text.relay_switch, "ax", @progbits
        .global relay_switch
        .type   relay_switch, @function
    relay_switch:
        push r0
        in   r0, 0x3f
        cli
        push r0
        push r1
        push r2
        push r3
        push r4
        push r5
        push r6
        push r7
        push r8
        push r9
        push r10
        push r11
        push r12
        push r13
        push r14
        push r15
        push r16
        push r17
        push r28
        push r29
        movw r30, r24
        in   r0, 0x3d
        st   Z, r0
        in   r0, 0x3e
        std  Z+1, r0
        movw r24, r22
        rjmp relay_load
        .size relay_switch, .-relay_switch

        .global relay_restore
        .type   relay_restore, @function
    relay_restore:
        cli
    relay_load:
        out  0x3e, r25
        out  0x3d, r24
        pop  r29
        pop  r28
        pop  r17
        pop  r16
        pop  r15
        pop  r14
        pop  r13
        pop  r12
        pop  r11
        pop  r10
        pop  r9
        pop  r8
        pop  r7
        pop  r6
        pop  r5
        pop  r4
        pop  r3
        pop  r2
        pop  r1
        pop  r0
        out  0x3f, r0
        pop  r0
        ret
        .size relay_restore, .-relay_restore
    "#
    );

    extern "C" {
        fn relay_switch(from: *mut usize, to: usize);
        fn relay_restore(sp: usize) -> !;
    }

    /// Saved stack pointer of a suspended task.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct StackPointer(usize);

    static_assertions::assert_eq_size!(StackPointer, usize);

    /// The CPU. One instance per chip.
    pub struct Avr {
        regs: Mmio,
    }

    impl Avr {
        /// # Safety
        ///
        /// At most one `Avr` may exist; it owns SREG, SP and SMCR.
        pub const unsafe fn new() -> Self {
            Self { regs: Mmio::new() }
        }
    }

    #[inline(always)]
    fn read_sreg() -> Sreg {
        let bits: u8;
        // SAFETY: reading SREG has no side effects.
        unsafe { asm!("in {0}, 0x3F", out(reg) bits, options(nomem, nostack, preserves_flags)) };
        Sreg::from_bits_retain(bits)
    }

    impl InterruptControl for Avr {
        #[inline(always)]
        fn disable_interrupts(&self) -> bool {
            let was_enabled = read_sreg().contains(Sreg::I);
            // SAFETY: masking interrupts is always sound; acts as a compiler barrier.
            unsafe { asm!("cli", options(nostack)) };
            was_enabled
        }

        #[inline(always)]
        fn restore_interrupts(&self, was_enabled: bool) {
            if was_enabled {
                // SAFETY: the caller masked interrupts and is handing the state back.
                unsafe { asm!("sei", options(nostack)) };
            }
        }

        fn interrupts_enabled(&self) -> bool {
            read_sreg().contains(Sreg::I)
        }
    }

    impl Arch for Avr {
        type Context = StackPointer;

        fn init_context(
            &self,
            entry: TaskEntry,
            stack: &'static mut [u8],
        ) -> Result<StackPointer, SpawnError> {
            let base = stack.as_ptr() as usize;
            let sp = frame::build_initial_frame(stack, entry as usize as u16)?;
            Ok(StackPointer(base + sp))
        }

        unsafe fn switch(&self, from: *mut StackPointer, to: *const StackPointer) {
            // SAFETY: per the trait contract both slots are exclusively ours.
            unsafe { relay_switch(from.cast::<usize>(), (*to).0) }
        }

        unsafe fn restore(&self, to: *const StackPointer) -> ! {
            // SAFETY: per the trait contract `to` holds a valid frame.
            unsafe { relay_restore((*to).0) }
        }

        fn arm_sleep(&self) {
            self.regs.write(SMCR, SMCR_IDLE_ENABLE);
        }

        fn disarm_sleep(&self) {
            self.regs.write(SMCR, 0);
        }

        fn wait_for_interrupt(&self) {
            // `sei` takes effect after the following instruction, so no
            // interrupt can slip in between the two.
            // SAFETY: sleeping with interrupts enabled always wakes on the next IRQ.
            unsafe { asm!("sei", "sleep", options(nostack)) };
        }

        fn stack_pointer(&self, context: &StackPointer) -> usize {
            context.0
        }

        /// Word address of the instruction the task resumes at.
        fn resume_address(&self, context: &StackPointer) -> usize {
            // SAFETY: a suspended task's frame occupies the bytes above its
            // saved stack pointer and nobody runs on that stack meanwhile.
            let frame_bytes = unsafe {
                core::slice::from_raw_parts(context.0 as *const u8, frame::MIN_STACK_BYTES)
            };
            frame::read_resume_address(frame_bytes, 0).map_or(0, usize::from)
        }
    }
}
