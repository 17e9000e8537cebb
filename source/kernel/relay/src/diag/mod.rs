// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Diagnostics: structured logging and the task dump
//! OWNERS: @kernel-team
//! PUBLIC API: log (macros, sinks), dump (Kernel::dump)
//! DEPENDS_ON: sched::Kernel
//! INVARIANTS: Diagnostics never block on another task

#[macro_use]
pub mod log;
pub mod dump;
