// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Interrupt-aware locking for kernel state
//! OWNERS: @kernel-sync-team
//! PUBLIC API: IrqMutex, IrqMutexGuard
//! DEPENDS_ON: spin::Mutex, arch::InterruptControl
//! INVARIANTS: Single core only; task-side locking masks interrupts

mod irq_mutex;

pub use irq_mutex::{IrqMutex, IrqMutexGuard};
