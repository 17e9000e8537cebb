// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Register access shared by relay peripheral drivers
//! OWNERS: @runtime
//! PUBLIC API: ByteRegisters, Mmio, mock::MockRegisters (feature `mock`)
//! DEPENDS_ON: core only
//! INVARIANTS: Addresses are data-space addresses; 16-bit writes go high byte first

#![cfg_attr(not(test), no_std)]
#![forbid(clippy::unwrap_used)]

/// Byte-wide register bus used by the USART and timer drivers.
pub trait ByteRegisters: Sync {
    fn read(&self, addr: usize) -> u8;
    fn write(&self, addr: usize, value: u8);

    /// Read-modify-write that sets `mask`. Not atomic with respect to interrupts.
    fn set_bits(&self, addr: usize, mask: u8) {
        let value = self.read(addr);
        self.write(addr, value | mask);
    }

    /// Read-modify-write that clears `mask`. Not atomic with respect to interrupts.
    fn clear_bits(&self, addr: usize, mask: u8) {
        let value = self.read(addr);
        self.write(addr, value & !mask);
    }

    /// Writes a 16-bit register pair whose low byte lives at `low_addr`.
    ///
    /// AVR latches the high byte into a temporary register, so it must be
    /// written first.
    fn write_u16(&self, low_addr: usize, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.write(low_addr + 1, high);
        self.write(low_addr, low);
    }
}

/// Volatile access to the memory-mapped I/O space.
#[derive(Debug)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// # Safety
    ///
    /// The caller must only pass addresses of real peripheral registers to
    /// the resulting bus, and must be the only owner of those registers.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl ByteRegisters for Mmio {
    #[inline(always)]
    fn read(&self, addr: usize) -> u8 {
        // SAFETY: `Mmio::new` obliges the owner to use register addresses only.
        unsafe { core::ptr::read_volatile(addr as *const u8) }
    }

    #[inline(always)]
    fn write(&self, addr: usize, value: u8) {
        // SAFETY: see `read`.
        unsafe { core::ptr::write_volatile(addr as *mut u8, value) }
    }
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    //! Register file backed by plain memory for host tests.

    use core::sync::atomic::{AtomicU8, Ordering};

    use super::ByteRegisters;

    /// Size of the modelled register window (the AVR I/O and extended I/O space).
    pub const WINDOW: usize = 0x100;

    /// 256 byte-wide registers. Accesses outside the window read as zero and
    /// drop writes.
    pub struct MockRegisters {
        cells: [AtomicU8; WINDOW],
    }

    impl MockRegisters {
        pub const fn new() -> Self {
            Self { cells: [const { AtomicU8::new(0) }; WINDOW] }
        }

        /// Stores `value` as if hardware had updated the register.
        pub fn poke(&self, addr: usize, value: u8) {
            if let Some(cell) = self.cells.get(addr) {
                cell.store(value, Ordering::SeqCst);
            }
        }

        pub fn peek(&self, addr: usize) -> u8 {
            self.cells.get(addr).map_or(0, |cell| cell.load(Ordering::SeqCst))
        }
    }

    impl Default for MockRegisters {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ByteRegisters for MockRegisters {
        fn read(&self, addr: usize) -> u8 {
            self.peek(addr)
        }

        fn write(&self, addr: usize, value: u8) {
            self.poke(addr, value);
        }
    }
}
