// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Error types for task creation
//! OWNERS: @kernel-sched-team
//! PUBLIC API: SpawnError
//! DEPENDS_ON: none
//! INVARIANTS: Errors are Copy and carry enough data to log without allocation

use core::fmt;

/// Error returned when creating a task.
#[must_use = "spawn errors must be handled explicitly"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// Every slot of the task table is occupied.
    TableFull { capacity: usize },
    /// The stack cannot hold the initial context frame.
    StackTooSmall { needed: usize, provided: usize },
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TableFull { capacity } => write!(f, "task table full ({capacity} slots)"),
            Self::StackTooSmall { needed, provided } => {
                write!(f, "stack too small: need {needed} bytes, got {provided}")
            }
        }
    }
}
