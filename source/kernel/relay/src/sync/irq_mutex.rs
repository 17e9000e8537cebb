// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: spin::Mutex wrapper that masks interrupts while held
//! OWNERS: @kernel-sync-team
//! PUBLIC API: IrqMutex::new(), IrqMutex::lock(), IrqMutex::lock_masked()
//! DEPENDS_ON: spin::Mutex, arch::InterruptControl
//! INVARIANTS: Re-entrant locking panics in debug builds; the interrupt
//!             state is restored only after the inner lock is released
//!
//! On a single core, masking interrupts is what actually excludes an ISR; the
//! spin lock underneath turns an accidental nested lock into a loud failure
//! instead of silent corruption.

use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
#[cfg(debug_assertions)]
use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch::InterruptControl;

pub struct IrqMutex<T> {
    inner: spin::Mutex<T>,
    #[cfg(debug_assertions)]
    held: AtomicBool,
}

impl<T> IrqMutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: spin::Mutex::new(value),
            #[cfg(debug_assertions)]
            held: AtomicBool::new(false),
        }
    }

    /// Masks interrupts through `irq`, then locks. Dropping the guard
    /// unlocks and restores the previous interrupt state.
    pub fn lock<'a>(&'a self, irq: &'a dyn InterruptControl) -> IrqMutexGuard<'a, T> {
        let was_enabled = irq.disable_interrupts();
        self.acquire(Some((irq, was_enabled)))
    }

    /// Locks without touching the interrupt flag.
    ///
    /// For interrupt handlers and code that has already masked interrupts.
    pub fn lock_masked(&self) -> IrqMutexGuard<'_, T> {
        self.acquire(None)
    }

    fn acquire<'a>(
        &'a self,
        restore: Option<(&'a dyn InterruptControl, bool)>,
    ) -> IrqMutexGuard<'a, T> {
        #[cfg(debug_assertions)]
        {
            if self.held.swap(true, Ordering::SeqCst) {
                panic!("relay: re-entrant kernel lock");
            }
        }
        IrqMutexGuard { parent: self, guard: ManuallyDrop::new(self.inner.lock()), restore }
    }
}

pub struct IrqMutexGuard<'a, T> {
    #[cfg_attr(not(debug_assertions), allow(dead_code))]
    parent: &'a IrqMutex<T>,
    guard: ManuallyDrop<spin::MutexGuard<'a, T>>,
    restore: Option<(&'a dyn InterruptControl, bool)>,
}

impl<T> Deref for IrqMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for IrqMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for IrqMutexGuard<'_, T> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.parent.held.store(false, Ordering::SeqCst);
        // SAFETY: the guard is dropped exactly once, here.
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        if let Some((irq, was_enabled)) = self.restore {
            irq.restore_interrupts(was_enabled);
        }
    }
}
