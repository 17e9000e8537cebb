// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Layout of the AVR saved-context frame
//! OWNERS: @kernel-arch-team
//! PUBLIC API: Sreg, build_initial_frame, read_resume_address, read_sreg, offsets
//! DEPENDS_ON: error::SpawnError
//! INVARIANTS: Frame matches the push order of `relay_switch` exactly
//!
//! AVR pushes post-decrement, so the saved stack pointer addresses the first
//! free byte below the frame. Reading upward from `sp + 1`:
//!
//! ```text
//! sp+1  r29        sp+3  r17 ... sp+18 r2
//! sp+2  r28        sp+19 r1
//!                  sp+20 SREG
//!                  sp+21 r0
//!                  sp+22 return address, high byte
//!                  sp+23 return address, low byte
//! ```
//!
//! This module is plain byte arithmetic and compiles on every target so the
//! layout can be checked on the host.

use bitflags::bitflags;

use crate::error::SpawnError;

bitflags! {
    /// AVR status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Sreg: u8 {
        const C = 1 << 0;
        const Z = 1 << 1;
        const N = 1 << 2;
        const V = 1 << 3;
        const S = 1 << 4;
        const H = 1 << 5;
        const T = 1 << 6;
        /// Global interrupt enable.
        const I = 1 << 7;
    }
}

/// Bytes of register state: r0, SREG, r1, r2..=r17, r28, r29.
pub const SAVED_REGISTERS: usize = 21;

/// Bytes of the return address on the 16-bit-PC parts.
pub const RETURN_ADDR_BYTES: usize = 2;

pub const FRAME_BYTES: usize = SAVED_REGISTERS + RETURN_ADDR_BYTES;

/// Offset of SREG from the saved stack pointer.
pub const SREG_OFFSET: usize = 20;

/// Offset of the return address high byte from the saved stack pointer.
pub const RESUME_ADDR_OFFSET: usize = SAVED_REGISTERS + 1;

/// Smallest stack `build_initial_frame` accepts: the frame plus the free
/// byte the stack pointer rests on.
pub const MIN_STACK_BYTES: usize = FRAME_BYTES + 1;

static_assertions::const_assert_eq!(RESUME_ADDR_OFFSET, 22);
static_assertions::const_assert_eq!(SREG_OFFSET + 2, RESUME_ADDR_OFFSET);

struct Pusher<'a> {
    stack: &'a mut [u8],
    sp: usize,
}

impl Pusher<'_> {
    fn push(&mut self, byte: u8) {
        self.stack[self.sp] = byte;
        self.sp -= 1;
    }
}

/// Writes the first-resume frame for `entry` at the top of `stack` and
/// returns the saved stack pointer as an offset into `stack`.
///
/// Restoring the frame leaves every saved register zero, SREG with only the
/// interrupt flag set, and returns into `entry`.
pub fn build_initial_frame(stack: &mut [u8], entry: u16) -> Result<usize, SpawnError> {
    if stack.len() < MIN_STACK_BYTES {
        return Err(SpawnError::StackTooSmall { needed: MIN_STACK_BYTES, provided: stack.len() });
    }
    let sp = stack.len() - 1;
    let mut frame = Pusher { stack, sp };

    let [low, high] = entry.to_le_bytes();
    frame.push(low);
    frame.push(high);
    frame.push(0); // r0
    frame.push(Sreg::I.bits());
    frame.push(0); // r1
    for _ in 2..=17 {
        frame.push(0);
    }
    frame.push(0); // r28
    frame.push(0); // r29
    Ok(frame.sp)
}

/// Reads the return address stored in a frame whose saved stack pointer is
/// `sp` (an offset into `stack`).
pub fn read_resume_address(stack: &[u8], sp: usize) -> Option<u16> {
    let high = *stack.get(sp.checked_add(RESUME_ADDR_OFFSET)?)?;
    let low = *stack.get(sp.checked_add(RESUME_ADDR_OFFSET + 1)?)?;
    Some(u16::from_be_bytes([high, low]))
}

pub fn read_sreg(stack: &[u8], sp: usize) -> Option<Sreg> {
    stack.get(sp.checked_add(SREG_OFFSET)?).map(|bits| Sreg::from_bits_retain(*bits))
}
