// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Relay, a cooperative multitasking kernel for single-core AVR microcontrollers
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit + proptest (task lists), simulator scenarios (sched, ipc, time, usart), tests/
//! PUBLIC API: Kernel, TaskId, QueueId, ListId, Recipient, Message, TaskEntry, SpawnError
//! DEPENDS_ON: relay-hal (register access), spin, bitflags, static_assertions
//! INVARIANTS: Every task is in at most one list; the running task is on the
//!             ready list; switches happen only inside kernel calls
//!
//! Tasks are created on caller-provided static stacks, run until they yield
//! or block, and talk to each other with synchronous send/receive/answer
//! rendezvous. Interrupt handlers wake tasks by answering them. When only
//! the idle task is runnable the CPU sleeps until the next interrupt.
//!
//! A board crate typically declares:
//!
//! ```ignore
//! static KERNEL: Kernel<Avr, 4> = Kernel::new(unsafe { Avr::new() });
//! fn idle() -> ! { KERNEL.idle_loop() }
//! ```
//!
//! then spawns its tasks and calls `KERNEL.start_tasking(idle, IDLE_STACK)`.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_arch = "avr", feature(asm_experimental_arch))]
#![forbid(clippy::unwrap_used)]

#[macro_use]
pub mod diag;

pub mod arch;
pub mod config;
pub mod error;
pub mod ipc;
pub mod sched;
pub mod sync;
pub mod task;
pub mod time;
pub mod types;
pub mod usart;

pub use error::SpawnError;
pub use ipc::Recipient;
pub use sched::Kernel;
pub use types::{ListId, Message, QueueId, TaskEntry, TaskId};
