// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Handle newtypes shared by the task table, scheduler and IPC
//! OWNERS: @kernel-sched-team
//! PUBLIC API: TaskId, QueueId, ListId, Message, TaskEntry
//! DEPENDS_ON: config::MAX_QUEUES
//! INVARIANTS: QueueId always indexes a configured queue; TaskId is a table slot

use core::fmt;

use crate::config::MAX_QUEUES;

/// Machine word carried by a rendezvous message.
///
/// Numbers, characters and addresses of caller-owned buffers all travel as a
/// `Message`. The kernel never interprets it.
pub type Message = usize;

/// Entry point of a task. Tasks never return.
pub type TaskEntry = fn() -> !;

/// Slot index of a task in the kernel's task table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TaskId(u8);

impl TaskId {
    #[inline]
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Free-standing task list owned by the kernel (a mutex, a driver queue,
/// the timer's tick queue).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct QueueId(u8);

impl QueueId {
    /// Builds a queue handle. Out-of-range ids fail at compile time when
    /// used in a `const` or `static` initializer.
    pub const fn new(raw: u8) -> Self {
        assert!((raw as usize) < MAX_QUEUES, "queue id out of range");
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue#{}", self.0)
    }
}

/// Names one of the kernel's task lists.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ListId {
    /// Tasks eligible to run, in round-robin order.
    Ready,
    /// Tasks parked in `receive` with no pending sender.
    Receivers,
    /// Senders waiting for the given task to answer them.
    Waiters(TaskId),
    /// A free-standing queue.
    Queue(QueueId),
}

impl From<QueueId> for ListId {
    fn from(queue: QueueId) -> Self {
        ListId::Queue(queue)
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListId::Ready => f.write_str("ready"),
            ListId::Receivers => f.write_str("receivers"),
            ListId::Waiters(owner) => write!(f, "waiters of {owner}"),
            ListId::Queue(queue) => write!(f, "{queue}"),
        }
    }
}
