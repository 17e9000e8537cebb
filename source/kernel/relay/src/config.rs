// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Compile-time kernel knobs
//! OWNERS: @kernel-team
//! PUBLIC API: MAX_QUEUES, IDLE_STACK_BYTES, TIMER_STACK_BYTES, TICK_HZ, DEADLINE_HORIZON, DEFAULT_CPU_HZ
//! DEPENDS_ON: none
//! INVARIANTS: Values are fixed at build time; no runtime mutation
//!
//! Task capacity is the `N` parameter of `sched::Kernel`, chosen by the
//! application. Everything else lives here.

/// Number of free-standing queues the kernel owns.
pub const MAX_QUEUES: usize = 8;

/// Suggested stack size for the idle task.
pub const IDLE_STACK_BYTES: usize = 64;

/// Suggested stack size for the timer task.
pub const TIMER_STACK_BYTES: usize = 64;

/// Timer interrupt frequency.
pub const TICK_HZ: u32 = 1_000;

/// A deadline counts as reached once `now - deadline` (wrapping) falls
/// below this bound. Sleeps longer than half of it are not supported.
pub const DEADLINE_HORIZON: u32 = i32::MAX as u32 / 2;

/// Core clock assumed by `UsartConfig::new` callers and board setup.
pub const DEFAULT_CPU_HZ: u32 = 16_000_000;

static_assertions::const_assert!(MAX_QUEUES <= u8::MAX as usize);
static_assertions::const_assert!(DEFAULT_CPU_HZ / TICK_HZ / 256 <= 256);
